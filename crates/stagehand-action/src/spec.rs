//! Computation specifications
//!
//! A [`Specification`] names one computation within a stage and carries
//! everything that affects its output. Two specifications with the same
//! opaque id are interchangeable for caching purposes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};

/// Immutable description of one computation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "SpecRecord", into = "SpecRecord")]
pub struct Specification {
    name: String,
    unit: String,
    command: Vec<String>,
    revision: Option<String>,
    params: Vec<String>,
    location: String,
    opaque_id: String,
}

impl Specification {
    /// Start building a specification for the given unit type
    #[inline]
    #[must_use]
    pub fn builder(unit: impl Into<String>) -> SpecBuilder {
        SpecBuilder::new(unit)
    }

    /// Name, unique within a stage
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit type key used to bind an implementation
    #[inline]
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Unit-specific invocation words
    #[inline]
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Optional revision marker
    #[inline]
    #[must_use]
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Ordered parameters passed to the unit
    #[inline]
    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Where the specification was declared, for diagnostics
    #[inline]
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Identity of everything that affects the output
    #[inline]
    #[must_use]
    pub fn opaque_id(&self) -> &str {
        &self.opaque_id
    }
}

impl Display for Specification {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.unit)
    }
}

/// Builder for [`Specification`]
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    name: Option<String>,
    unit: String,
    command: Vec<String>,
    revision: Option<String>,
    params: Vec<String>,
    location: String,
}

impl SpecBuilder {
    /// Create builder for the given unit type
    #[must_use]
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            name: None,
            unit: unit.into(),
            command: Vec::new(),
            revision: None,
            params: Vec::new(),
            location: String::new(),
        }
    }

    /// Set explicit name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set invocation words
    #[must_use]
    pub fn command<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = words.into_iter().map(Into::into).collect();
        self
    }

    /// Set revision marker
    #[must_use]
    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Set parameters
    #[must_use]
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Set declaration location
    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Finish the specification, computing its opaque id
    ///
    /// # Errors
    /// Returns error if the explicit name is not a valid specification name
    pub fn build(self) -> Result<Specification, SpecError> {
        let opaque_id = compute_opaque_id(
            &self.unit,
            &self.command,
            &self.params,
            self.revision.as_deref(),
        );
        let name = match self.name {
            Some(name) => {
                validate_name(&name)?;
                name
            }
            None => format!("unnamed_{}", &opaque_id[..8]),
        };

        Ok(Specification {
            name,
            unit: self.unit,
            command: self.command,
            revision: self.revision,
            params: self.params,
            location: self.location,
            opaque_id,
        })
    }
}

/// SHA-256 over every output-affecting property, hex encoded
#[must_use]
pub fn compute_opaque_id(
    unit: &str,
    command: &[String],
    params: &[String],
    revision: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hash_field(&mut hasher, unit);
    for list in [command, params] {
        hasher.update((list.len() as u64).to_le_bytes());
        for item in list {
            hash_field(&mut hasher, item);
        }
    }
    match revision {
        Some(revision) => {
            hasher.update([1]);
            hash_field(&mut hasher, revision);
        }
        None => hasher.update([0]),
    }
    hex::encode(hasher.finalize())
}

/// Length-prefixed so adjacent fields cannot run into each other
fn hash_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Check a name against `[a-zA-Z0-9_.][a-zA-Z0-9_.-]+`
///
/// # Errors
/// Returns [`SpecError::InvalidName`] if the name does not match
pub fn validate_name(name: &str) -> Result<(), SpecError> {
    let lead = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.';
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if lead(first) => {
            let rest = chars.as_str();
            !rest.is_empty() && rest.chars().all(|c| lead(c) || c == '-')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SpecError::InvalidName(name.to_string()))
    }
}

/// Errors building or decoding specifications
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    /// Name does not match the allowed pattern
    #[error("invalid specification name: '{0}' (must match [a-zA-Z0-9_.][a-zA-Z0-9_.-]+)")]
    InvalidName(String),
}

/// Serialized form; the opaque id is recomputed when absent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecRecord {
    name: String,
    unit: String,
    #[serde(default)]
    command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revision: Option<String>,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default)]
    location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    opaque_id: Option<String>,
}

impl TryFrom<SpecRecord> for Specification {
    type Error = SpecError;

    fn try_from(record: SpecRecord) -> Result<Self, Self::Error> {
        validate_name(&record.name)?;
        let opaque_id = record.opaque_id.unwrap_or_else(|| {
            compute_opaque_id(
                &record.unit,
                &record.command,
                &record.params,
                record.revision.as_deref(),
            )
        });
        Ok(Self {
            name: record.name,
            unit: record.unit,
            command: record.command,
            revision: record.revision,
            params: record.params,
            location: record.location,
            opaque_id,
        })
    }
}

impl From<Specification> for SpecRecord {
    fn from(spec: Specification) -> Self {
        Self {
            name: spec.name,
            unit: spec.unit,
            command: spec.command,
            revision: spec.revision,
            params: spec.params,
            location: spec.location,
            opaque_id: Some(spec.opaque_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(params: &[&str]) -> Specification {
        Specification::builder("command")
            .name("compile")
            .command(["./build.sh", "--fast"])
            .params(params.iter().copied())
            .build()
            .unwrap()
    }

    #[test]
    fn opaque_id_is_stable() {
        assert_eq!(spec(&["a"]).opaque_id(), spec(&["a"]).opaque_id());
        assert_eq!(spec(&["a"]).opaque_id().len(), 64);
    }

    #[test]
    fn opaque_id_separates_list_elements() {
        let joined = Specification::builder("command")
            .name("compile")
            .params(["a,b"])
            .build()
            .unwrap();
        let split = Specification::builder("command")
            .name("compile")
            .params(["a", "b"])
            .build()
            .unwrap();
        assert_ne!(joined.opaque_id(), split.opaque_id());

        let spaced = Specification::builder("command").name("run").command(["x y"]).build().unwrap();
        let words = Specification::builder("command").name("run").command(["x", "y"]).build().unwrap();
        assert_ne!(spaced.opaque_id(), words.opaque_id());

        let shifted = Specification::builder("command").name("run").command(["x"]).params(["y"]).build().unwrap();
        assert_ne!(words.opaque_id(), shifted.opaque_id());
    }

    #[test]
    fn opaque_id_tracks_params_and_revision() {
        assert_ne!(spec(&["a"]).opaque_id(), spec(&["b"]).opaque_id());

        let revised = Specification::builder("command")
            .name("compile")
            .command(["./build.sh", "--fast"])
            .params(["a"])
            .revision("2")
            .build()
            .unwrap();
        assert_ne!(revised.opaque_id(), spec(&["a"]).opaque_id());
    }

    #[test]
    fn location_does_not_affect_identity() {
        let located = Specification::builder("command")
            .name("compile")
            .command(["./build.sh", "--fast"])
            .params(["a"])
            .location("stage.yml#units[0]")
            .build()
            .unwrap();
        assert_eq!(located.opaque_id(), spec(&["a"]).opaque_id());
    }

    #[test]
    fn unnamed_spec_uses_id_prefix() {
        let spec = Specification::builder("command").command(["true"]).build().unwrap();
        assert_eq!(spec.name(), format!("unnamed_{}", &spec.opaque_id()[..8]));
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("build.release-x86_64").is_ok());
        assert!(validate_name(".hidden").is_ok());
        assert!(validate_name("a").is_err());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("with space").is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn deserialize_computes_missing_id() {
        let spec: Specification =
            serde_yaml::from_str("name: compile\nunit: command\ncommand: [./build.sh, --fast]\nparams: [a]\n")
                .unwrap();
        assert_eq!(spec.opaque_id(), self::spec(&["a"]).opaque_id());
    }

    #[test]
    fn deserialize_rejects_invalid_name() {
        let result: Result<Specification, _> = serde_yaml::from_str("name: 'bad name'\nunit: command\n");
        assert!(result.is_err());
    }
}
