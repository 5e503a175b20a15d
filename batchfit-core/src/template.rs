//! Placeholder templates
//!
//! Templates are plain text with `{{ key }}` placeholders. Keys are matched
//! case-insensitively and may carry a leading dot, so `{{ .Name }}` and
//! `{{name}}` are the same placeholder. Every placeholder must be supplied.

use crate::error::TemplateError;

/// Render `template`, substituting each placeholder from `values`
///
/// # Arguments
/// * `template` - Template text
/// * `values` - `(key, value)` pairs available to the template
///
/// # Errors
/// Returns an error if a placeholder is unterminated, empty, or names a key
/// missing from `values`.
///
/// # Example
/// ```
/// use batchfit_core::template::render;
///
/// let out = render("{{ .Name }}_out", &[("name", "run001")])?;
/// assert_eq!(out, "run001_out");
/// # Ok::<(), batchfit_core::error::TemplateError>(())
/// ```
pub fn render(template: &str, values: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);

        let after_open = &rest[start + 2..];
        let end = after_open
            .find("}}")
            .ok_or(TemplateError::Unterminated(offset + start))?;

        let key = after_open[..end].trim();
        let key = key.strip_prefix('.').unwrap_or(key);
        if key.is_empty() {
            return Err(TemplateError::EmptyKey(offset + start));
        }

        let value = values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| *value)
            .ok_or_else(|| TemplateError::UnknownKey(key.to_string()))?;
        output.push_str(value);

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }

    output.push_str(rest);
    Ok(output)
}
