use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;

/// Outcome of a validation pass. Valid when no errors were recorded;
/// warnings never invalidate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Append another report's findings, prefixing each with `scope`.
    pub fn absorb(&mut self, scope: &str, other: ValidationReport) {
        self.errors
            .extend(other.errors.into_iter().map(|e| format!("{scope}: {e}")));
        self.warnings
            .extend(other.warnings.into_iter().map(|w| format!("{scope}: {w}")));
    }
}

impl Serialize for ValidationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ValidationReport", 3)?;
        state.serialize_field("isValid", &self.is_valid())?;
        state.serialize_field("errors", &self.errors)?;
        state.serialize_field("warnings", &self.warnings)?;
        state.end()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} errors, {} warnings)",
            if self.is_valid() { "valid" } else { "invalid" },
            self.errors.len(),
            self.warnings.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_do_not_invalidate() {
        let mut report = ValidationReport::default();
        assert!(report.is_valid());
        report.warning("large file");
        assert!(report.is_valid());
        report.error("bad checksum");
        assert!(!report.is_valid());
        assert_eq!(report.to_string(), "invalid (1 errors, 1 warnings)");
    }

    #[test]
    fn test_absorb_prefixes_scope() {
        let mut inner = ValidationReport::default();
        inner.error("missing file");
        let mut outer = ValidationReport::default();
        outer.absorb("photos", inner);
        assert_eq!(outer.errors, vec!["photos: missing file".to_string()]);
    }

    #[test]
    fn test_json_carries_validity() {
        let mut report = ValidationReport::default();
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({ "isValid": true, "errors": [], "warnings": [] })
        );
        report.error("bad checksum");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["errors"][0], "bad checksum");
    }
}
