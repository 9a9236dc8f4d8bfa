//! Command text sink and the final executable command.
//!
//! Fragments and statements write SQL into a `CommandBuilder`. Parameters
//! are rendered as PostgreSQL positional parameters (`$1`, `$2`, ...) in
//! order of appearance. The builder records where each parameter landed in
//! the text, so compiled query plans can split the text at those positions
//! and rebind new values without scanning the SQL again.

use crate::value::SqlValue;
use serde::Serialize;
use std::ops::Range;

/// Marker standing in for a parameter when compiled command text is displayed
pub const PARAMETER_PLACEHOLDER: &str = "^";

/// Marker used by raw SQL fragments for their positional arguments
pub const RAW_ARGUMENT_MARKER: char = '?';

/// How a parameter value was derived from the value written in the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueTransform {
    Identity,
    /// `value%`
    StartsWith,
    /// `%value`
    EndsWith,
    /// `%value%`
    Contains,
    /// The value as a `jsonb` document
    ToJson,
}

impl ValueTransform {
    pub fn apply(&self, value: &SqlValue) -> SqlValue {
        match (self, value) {
            (ValueTransform::Identity, value) => value.clone(),
            (ValueTransform::ToJson, value) => SqlValue::Json(value.to_json()),
            (ValueTransform::StartsWith, SqlValue::Text(text)) => {
                SqlValue::Text(format!("{}%", escape_like(text)))
            }
            (ValueTransform::EndsWith, SqlValue::Text(text)) => {
                SqlValue::Text(format!("%{}", escape_like(text)))
            }
            (ValueTransform::Contains, SqlValue::Text(text)) => {
                SqlValue::Text(format!("%{}%", escape_like(text)))
            }
            (_, other) => other.clone(),
        }
    }
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Where a command parameter came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ParameterOrigin {
    /// The value appears verbatim in the query
    Literal,
    /// The value is `transform(raw)`
    Transformed {
        raw: SqlValue,
        transform: ValueTransform,
    },
    /// The executing session's tenant id
    Tenant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandParameter {
    pub value: SqlValue,
    pub origin: ParameterOrigin,
}

impl CommandParameter {
    pub fn literal(value: SqlValue) -> Self {
        Self {
            value,
            origin: ParameterOrigin::Literal,
        }
    }

    /// Value compared against template members when matching placeholders
    pub fn source_value(&self) -> Option<&SqlValue> {
        match &self.origin {
            ParameterOrigin::Literal => Some(&self.value),
            ParameterOrigin::Transformed { raw, .. } => Some(raw),
            ParameterOrigin::Tenant => None,
        }
    }

    pub fn transform(&self) -> ValueTransform {
        match &self.origin {
            ParameterOrigin::Transformed { transform, .. } => *transform,
            _ => ValueTransform::Identity,
        }
    }
}

/// Accumulates command text and parameters
#[derive(Debug, Default)]
pub struct CommandBuilder {
    text: String,
    parameters: Vec<CommandParameter>,
    spans: Vec<Range<usize>>,
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sql: &str) {
        self.text.push_str(sql);
    }

    fn push_parameter(&mut self, parameter: CommandParameter) -> usize {
        self.parameters.push(parameter);
        let position = self.parameters.len();
        let start = self.text.len();
        self.text.push('$');
        self.text.push_str(&position.to_string());
        self.spans.push(start..self.text.len());
        position
    }

    /// Append a parameter placeholder, returning its 1-based position
    pub fn append_parameter(&mut self, value: SqlValue) -> usize {
        self.push_parameter(CommandParameter::literal(value))
    }

    pub fn append_transformed_parameter(&mut self, raw: &SqlValue, transform: ValueTransform) -> usize {
        self.push_parameter(CommandParameter {
            value: transform.apply(raw),
            origin: ParameterOrigin::Transformed {
                raw: raw.clone(),
                transform,
            },
        })
    }

    pub fn append_tenant_parameter(&mut self, tenant_id: &str) -> usize {
        self.push_parameter(CommandParameter {
            value: SqlValue::Text(tenant_id.to_string()),
            origin: ParameterOrigin::Tenant,
        })
    }

    /// Append raw SQL, replacing each `?` with the next argument
    pub fn append_with_arguments(&mut self, sql: &str, arguments: &[SqlValue]) {
        let mut arguments = arguments.iter();
        for c in sql.chars() {
            if c == RAW_ARGUMENT_MARKER {
                match arguments.next() {
                    Some(value) => {
                        self.append_parameter(value.clone());
                    }
                    None => self.text.push(c),
                }
            } else {
                self.text.push(c);
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[CommandParameter] {
        &self.parameters
    }

    pub fn build(self) -> Command {
        Command {
            text: self.text,
            parameters: self.parameters,
            spans: self.spans,
        }
    }
}

/// Executable command: SQL text plus positional parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub text: String,
    pub parameters: Vec<CommandParameter>,
    /// Byte range of each `$n` in `text`
    #[serde(skip)]
    spans: Vec<Range<usize>>,
}

impl Command {
    /// The text split at every parameter position
    pub fn template(&self) -> CommandTemplate {
        let mut segments = Vec::with_capacity(self.spans.len() + 1);
        let mut start = 0;
        for span in &self.spans {
            segments.push(self.text[start..span.start].to_string());
            start = span.end;
        }
        segments.push(self.text[start..].to_string());
        CommandTemplate { segments }
    }

    /// Text with every parameter shown as the placeholder marker
    pub fn placeholder_text(&self) -> String {
        self.template().text()
    }

    pub fn values(&self) -> Vec<&SqlValue> {
        self.parameters.iter().map(|p| &p.value).collect()
    }
}

/// Command text with its parameters cut out, ready to rebind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    segments: Vec<String>,
}

impl CommandTemplate {
    pub fn parameter_count(&self) -> usize {
        self.segments.len() - 1
    }

    /// Text with `PARAMETER_PLACEHOLDER` at every parameter position
    pub fn text(&self) -> String {
        self.segments.join(PARAMETER_PLACEHOLDER)
    }

    /// Number the parameter positions in order and attach `parameters`
    pub fn bind(&self, parameters: Vec<CommandParameter>) -> Command {
        let mut sql = CommandBuilder::new();
        let mut parameters = parameters.into_iter();
        for (index, segment) in self.segments.iter().enumerate() {
            if index > 0 {
                let parameter = parameters
                    .next()
                    .unwrap_or_else(|| CommandParameter::literal(SqlValue::Null));
                sql.push_parameter(parameter);
            }
            sql.append(segment);
        }
        sql.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_are_numbered_in_order() {
        let mut sql = CommandBuilder::new();
        sql.append("select d.data from t as d where a = ");
        assert_eq!(sql.append_parameter(SqlValue::Int(1)), 1);
        sql.append(" and b = ");
        assert_eq!(sql.append_parameter(SqlValue::Text("x".into())), 2);

        let command = sql.build();
        assert_eq!(command.text, "select d.data from t as d where a = $1 and b = $2");
        assert_eq!(command.values(), vec![&SqlValue::Int(1), &SqlValue::Text("x".into())]);
    }

    #[test]
    fn test_raw_arguments() {
        let mut sql = CommandBuilder::new();
        sql.append_with_arguments(
            "d.data ->> 'Name' = ? or d.data ->> 'Other' = ?",
            &[SqlValue::Text("a".into()), SqlValue::Text("b".into())],
        );
        assert_eq!(sql.text(), "d.data ->> 'Name' = $1 or d.data ->> 'Other' = $2");
        assert_eq!(sql.parameters().len(), 2);
    }

    #[test]
    fn test_raw_arguments_keep_extra_markers() {
        let mut sql = CommandBuilder::new();
        sql.append_with_arguments("d.data ? 'Key'", &[]);
        assert_eq!(sql.text(), "d.data ? 'Key'");
    }

    #[test]
    fn test_template_rebinds_parameters() {
        let mut sql = CommandBuilder::new();
        sql.append("where a = ");
        for i in 0..11 {
            if i > 0 {
                sql.append(" or a = ");
            }
            sql.append_parameter(SqlValue::Int(i));
        }
        let command = sql.build();
        let template = command.template();
        assert_eq!(template.parameter_count(), 11);
        assert!(!template.text().contains('$'));
        assert_eq!(template.text().matches('^').count(), 11);

        let rebuilt = template.bind(command.parameters.clone());
        assert_eq!(rebuilt, command);
    }

    #[test]
    fn test_template_leaves_sql_markers_alone() {
        let mut sql = CommandBuilder::new();
        sql.append("d.data ->> 'String' ~ '^A$1' and power(a, 2) ^ 2 = ");
        sql.append_parameter(SqlValue::Int(4));
        let command = sql.build();

        let template = command.template();
        assert_eq!(template.parameter_count(), 1);
        assert_eq!(
            template.text(),
            "d.data ->> 'String' ~ '^A$1' and power(a, 2) ^ 2 = ^"
        );

        let rebuilt = template.bind(vec![CommandParameter::literal(SqlValue::Int(9))]);
        assert_eq!(
            rebuilt.text,
            "d.data ->> 'String' ~ '^A$1' and power(a, 2) ^ 2 = $1"
        );
        assert_eq!(rebuilt.values(), vec![&SqlValue::Int(9)]);
    }

    #[test]
    fn test_transforms() {
        let raw = SqlValue::Text("ab_c".into());
        assert_eq!(
            ValueTransform::StartsWith.apply(&raw),
            SqlValue::Text("ab\\_c%".into())
        );
        assert_eq!(ValueTransform::EndsWith.apply(&raw), SqlValue::Text("%ab\\_c".into()));
        assert_eq!(ValueTransform::Contains.apply(&raw), SqlValue::Text("%ab\\_c%".into()));
        assert_eq!(ValueTransform::Identity.apply(&raw), raw);
        assert_eq!(
            ValueTransform::ToJson.apply(&SqlValue::TextArray(vec!["a".into()])),
            SqlValue::Json(serde_json::json!(["a"]))
        );
    }

    #[test]
    fn test_transformed_parameter_keeps_source_value() {
        let mut sql = CommandBuilder::new();
        sql.append_transformed_parameter(&SqlValue::Text("abc".into()), ValueTransform::StartsWith);
        sql.append_tenant_parameter("tenant-a");
        let command = sql.build();

        assert_eq!(command.parameters[0].value, SqlValue::Text("abc%".into()));
        assert_eq!(
            command.parameters[0].source_value(),
            Some(&SqlValue::Text("abc".into()))
        );
        assert_eq!(command.parameters[1].source_value(), None);
    }
}
