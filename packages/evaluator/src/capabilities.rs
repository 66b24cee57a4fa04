//! What the user may do with a page in each mode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authoring / viewing mode of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Raw document text
    Code,
    /// Structural editing on the rendered tree
    #[default]
    Edit,
    /// Interactive; mutations execute
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Code => "code",
            Mode::Edit => "edit",
            Mode::Live => "live",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(Mode::Code),
            "edit" => Ok(Mode::Edit),
            "live" => Ok(Mode::Live),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

/// Capability set derived from a [`Mode`].
///
/// Fields are private; the only way to get a value is [`Capabilities::for_mode`]
/// so structural editing and mutation execution are never on together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    structural_editing: bool,
    drag: bool,
    surface_validation: bool,
    execute_mutations: bool,
}

impl Capabilities {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Code => Self {
                structural_editing: false,
                drag: false,
                surface_validation: false,
                execute_mutations: false,
            },
            Mode::Edit => Self {
                structural_editing: true,
                drag: true,
                surface_validation: false,
                execute_mutations: false,
            },
            Mode::Live => Self {
                structural_editing: false,
                drag: false,
                surface_validation: true,
                execute_mutations: true,
            },
        }
    }

    pub fn structural_editing(&self) -> bool {
        self.structural_editing
    }

    pub fn drag(&self) -> bool {
        self.drag
    }

    pub fn surface_validation(&self) -> bool {
        self.surface_validation
    }

    pub fn execute_mutations(&self) -> bool {
        self.execute_mutations
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::for_mode(Mode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_mode_edits_and_executes() {
        for mode in [Mode::Code, Mode::Edit, Mode::Live] {
            let caps = Capabilities::for_mode(mode);
            assert!(
                !(caps.structural_editing() && caps.execute_mutations()),
                "{} enables both editing and execution",
                mode
            );
        }
    }

    #[test]
    fn test_mode_capabilities() {
        let edit = Capabilities::for_mode(Mode::Edit);
        assert!(edit.structural_editing() && edit.drag());
        assert!(!edit.surface_validation() && !edit.execute_mutations());

        let live = Capabilities::for_mode(Mode::Live);
        assert!(live.execute_mutations() && live.surface_validation());
        assert!(!live.structural_editing() && !live.drag());

        assert_eq!(
            Capabilities::for_mode(Mode::Code),
            Capabilities {
                structural_editing: false,
                drag: false,
                surface_validation: false,
                execute_mutations: false,
            }
        );
    }

    #[test]
    fn test_mode_parses() {
        assert_eq!("live".parse::<Mode>(), Ok(Mode::Live));
        assert!("preview".parse::<Mode>().is_err());
    }
}
