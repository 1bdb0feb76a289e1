//! Client-facing project definition DTOs and their validation.

use serde::Deserialize;
use validator::Validate;

use crate::error::CoreError;
use crate::schema::OutputSchema;

/// Maximum length of a project's instructions, in characters.
pub const MAX_INSTRUCTIONS_LEN: u64 = 20_000;

/// DTO for `create`: the agent's natural-language task and the optional
/// shape of its expected result.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProject {
    #[validate(length(min = 1, max = MAX_INSTRUCTIONS_LEN))]
    pub instructions: String,
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
}

/// DTO for editing an IDLE project's definition. All fields optional.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProject {
    #[validate(length(min = 1, max = MAX_INSTRUCTIONS_LEN))]
    pub instructions: Option<String>,
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
}

/// A definition that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDefinition {
    pub instructions: String,
    pub output_schema: OutputSchema,
}

/// Validated subset of an [`UpdateProject`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionPatch {
    pub instructions: Option<String>,
    pub output_schema: Option<OutputSchema>,
}

impl NewProject {
    /// Validate into a [`ProjectDefinition`] without touching any storage.
    pub fn into_definition(self) -> Result<ProjectDefinition, CoreError> {
        self.validate()?;
        Ok(ProjectDefinition {
            instructions: validate_instructions(self.instructions)?,
            output_schema: OutputSchema::parse(self.output_schema)?,
        })
    }
}

impl UpdateProject {
    pub fn into_patch(self) -> Result<DefinitionPatch, CoreError> {
        self.validate()?;
        if self.instructions.is_none() && self.output_schema.is_none() {
            return Err(CoreError::Validation(
                "at least one of instructions or output_schema is required".to_string(),
            ));
        }
        Ok(DefinitionPatch {
            instructions: self.instructions.map(validate_instructions).transpose()?,
            output_schema: self
                .output_schema
                .map(|schema| OutputSchema::parse(Some(schema)))
                .transpose()?,
        })
    }
}

fn validate_instructions(instructions: String) -> Result<String, CoreError> {
    if instructions.trim().is_empty() {
        return Err(CoreError::Validation(
            "instructions must not be blank".to_string(),
        ));
    }
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn new_project(instructions: &str, schema: Option<serde_json::Value>) -> NewProject {
        NewProject {
            instructions: instructions.to_string(),
            output_schema: schema,
        }
    }

    #[test]
    fn valid_definition() {
        let definition = new_project("collect invoices", Some(json!({"type": "object"})))
            .into_definition()
            .unwrap();
        assert_eq!(definition.instructions, "collect invoices");
        assert_eq!(definition.output_schema.as_value(), &json!({"type": "object"}));
    }

    #[test]
    fn empty_instructions_rejected() {
        assert_matches!(
            new_project("", None).into_definition(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn blank_instructions_rejected() {
        assert_matches!(
            new_project("   \n", None).into_definition(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn oversized_instructions_rejected() {
        let long = "a".repeat(MAX_INSTRUCTIONS_LEN as usize + 1);
        assert_matches!(
            new_project(&long, None).into_definition(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn instructions_at_the_limit_accepted() {
        let longest = "a".repeat(MAX_INSTRUCTIONS_LEN as usize);
        assert!(new_project(&longest, None).into_definition().is_ok());
    }

    #[test]
    fn oversized_patch_rejected() {
        let patch = UpdateProject {
            instructions: Some("a".repeat(MAX_INSTRUCTIONS_LEN as usize + 1)),
            output_schema: None,
        };
        assert_matches!(patch.into_patch(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn malformed_schema_rejected() {
        assert_matches!(
            new_project("collect invoices", Some(json!(42))).into_definition(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn empty_patch_rejected() {
        assert_matches!(
            UpdateProject::default().into_patch(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn patch_keeps_unset_fields_empty() {
        let patch = UpdateProject {
            instructions: Some("collect receipts".into()),
            output_schema: None,
        }
        .into_patch()
        .unwrap();
        assert_eq!(patch.instructions.as_deref(), Some("collect receipts"));
        assert!(patch.output_schema.is_none());
    }
}
