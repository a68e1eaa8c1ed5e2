//! Shader library and its entry-point contract.

use std::borrow::Cow;

use super::BackendError;

/// Step kernel entry point (`@compute`).
pub const STEP_ENTRY_POINT: &str = "sim_main";
/// Full-surface triangle entry point (`@vertex`).
pub const VERTEX_ENTRY_POINT: &str = "full_screen_tri";
/// Grid visualiser entry point (`@fragment`).
pub const FRAGMENT_ENTRY_POINT: &str = "sim_visualizer";

// Embed shader source at compile time
const GRAY_SCOTT_SHADER: &str = include_str!("shaders/gray_scott.wgsl");

/// WGSL source holding the step and presentation programs.
#[derive(Debug, Clone)]
pub struct ProgramLibrary {
    label: Cow<'static, str>,
    source: Cow<'static, str>,
}

impl ProgramLibrary {
    /// The library shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_wgsl("gray_scott.wgsl", GRAY_SCOTT_SHADER)
    }

    pub fn from_wgsl(
        label: impl Into<Cow<'static, str>>,
        source: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the source declares a function called `name`.
    pub fn has_entry_point(&self, name: &str) -> bool {
        self.source
            .lines()
            .map(|line| line.split("//").next().unwrap_or_default())
            .flat_map(|code| code.match_indices("fn ").map(move |(i, _)| &code[i + 3..]))
            .any(|rest| {
                rest.trim_start()
                    .strip_prefix(name)
                    .is_some_and(|after| after.trim_start().starts_with('('))
            })
    }

    /// Fail with [`BackendError::MissingEntryPoint`] unless `name` is declared.
    pub fn require(&self, name: &'static str) -> Result<(), BackendError> {
        if self.has_entry_point(name) {
            Ok(())
        } else {
            Err(BackendError::MissingEntryPoint {
                library: self.label.to_string(),
                entry_point: name,
            })
        }
    }

    /// Check the step program's entry point.
    pub fn require_step(&self) -> Result<(), BackendError> {
        self.require(STEP_ENTRY_POINT)
    }

    /// Check both presentation entry points.
    pub fn require_present(&self) -> Result<(), BackendError> {
        self.require(VERTEX_ENTRY_POINT)?;
        self.require(FRAGMENT_ENTRY_POINT)
    }
}

impl Default for ProgramLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_declares_all_entry_points() {
        let library = ProgramLibrary::builtin();
        library.require_step().unwrap();
        library.require_present().unwrap();
    }

    #[test]
    fn test_prefix_is_not_a_match() {
        let library = ProgramLibrary::from_wgsl("t", "fn sim_main_old() {}\nfn helper(x: f32) {}");
        assert!(!library.has_entry_point("sim_main"));
        assert!(library.has_entry_point("helper"));
    }

    #[test]
    fn test_commented_out_declaration_is_ignored() {
        let library = ProgramLibrary::from_wgsl("t", "// fn sim_main() {}\n");
        assert!(matches!(
            library.require_step(),
            Err(BackendError::MissingEntryPoint {
                entry_point: "sim_main",
                ..
            })
        ));
    }
}
