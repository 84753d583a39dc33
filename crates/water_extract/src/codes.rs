use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What a source parameter code means once it lands in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMapping {
    pub parameter: String,
    pub unit: String,
    pub value_type: String,
    pub version: String,
}

impl CodeMapping {
    pub fn new(
        parameter: impl Into<String>,
        unit: impl Into<String>,
        value_type: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            parameter: parameter.into(),
            unit: unit.into(),
            value_type: value_type.into(),
            version: version.into(),
        }
    }
}

/// Lookup from a short parameter code (e.g. USGS `00060`) to its [`CodeMapping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    entries: BTreeMap<String, CodeMapping>,
}

impl Default for CodeTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CodeTable {
    /// Table with no codes; every lookup misses.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        for (code, parameter, unit, value_type) in [
            ("00065", "Stage", "feet", "INST-VAL"),
            ("00061", "Flow", "cfs", "PER-AVER"),
            ("00060", "Flow", "cfs", "INST-VAL"),
            ("62614", "Elev", "feet", "INST-VAL"),
        ] {
            entries.insert(
                code.to_string(),
                CodeMapping::new(parameter, unit, value_type, "WATER-USGS"),
            );
        }
        Self { entries }
    }

    pub fn with_override(mut self, code: impl Into<String>, mapping: CodeMapping) -> Self {
        self.entries.insert(code.into(), mapping);
        self
    }

    pub fn extend(&mut self, overrides: impl IntoIterator<Item = (String, CodeMapping)>) {
        self.entries.extend(overrides);
    }

    pub fn lookup(&self, code: &str) -> Option<&CodeMapping> {
        self.entries.get(code.trim())
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_usgs_codes() {
        let table = CodeTable::builtin();
        let flow = table.lookup("00060").expect("00060");
        assert_eq!(flow.parameter, "Flow");
        assert_eq!(flow.unit, "cfs");
        assert_eq!(flow.value_type, "INST-VAL");
        assert_eq!(flow.version, "WATER-USGS");

        assert_eq!(table.lookup("00061").unwrap().value_type, "PER-AVER");
        assert_eq!(table.lookup("62614").unwrap().parameter, "Elev");
        assert!(table.lookup("99999").is_none());
    }

    #[test]
    fn override_replaces_and_adds() {
        let table = CodeTable::builtin()
            .with_override("00065", CodeMapping::new("Stage", "m", "INST-VAL", "METRIC"))
            .with_override("00010", CodeMapping::new("Temp-Water", "C", "INST-VAL", "USGS"));
        assert_eq!(table.lookup("00065").unwrap().unit, "m");
        assert_eq!(table.lookup("00010").unwrap().parameter, "Temp-Water");
        assert_eq!(table.codes().count(), 5);
    }
}
