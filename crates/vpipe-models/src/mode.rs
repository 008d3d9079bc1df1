//! Pipeline execution mode.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Execution mode shared by every step of a pipeline run.
///
/// Both modes run the same step definitions; only quality settings differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Fast, reduced-fidelity output for interactive feedback.
    Preview,
    /// Full-fidelity output for the delivered artifact.
    #[default]
    Final,
}

impl ProcessingMode {
    /// Map the multipart `preview` flag onto a mode.
    pub fn from_preview_flag(preview: bool) -> Self {
        if preview {
            Self::Preview
        } else {
            Self::Final
        }
    }

    pub fn is_preview(self) -> bool {
        matches!(self, Self::Preview)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Final => "final",
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
