//! Template expressions for pipeline step inputs.
//!
//! Supports `{{ input }}`, `{{ previous }}`, `{{ steps.<id> }}` (also
//! `{{ steps.<id>.output }}`) and `{{ vars.<name> }}`.

use crate::error::PipelineError;
use std::collections::HashMap;

/// A parsed `{{ ... }}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Input,
    Previous,
    Step(String),
    Var(String),
}

/// Values available while rendering a step input.
#[derive(Debug)]
pub struct TemplateContext<'a> {
    pub input: &'a str,
    pub previous: &'a str,
    pub step_outputs: &'a HashMap<String, String>,
    pub vars: &'a HashMap<String, String>,
}

/// Render `{{ ... }}` expressions in a template.
pub fn render(template: &str, ctx: &TemplateContext<'_>) -> Result<String, PipelineError> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let (reference, remaining) = split_expression(&rest[start + 2..], template)?;
        result.push_str(resolve(&reference, ctx)?);
        rest = remaining;
    }
    result.push_str(rest);

    Ok(result)
}

/// Every reference in a template, in order of appearance.
pub fn references(template: &str) -> Result<Vec<Reference>, PipelineError> {
    let mut refs = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let (reference, remaining) = split_expression(&rest[start + 2..], template)?;
        refs.push(reference);
        rest = remaining;
    }
    Ok(refs)
}

/// Parse the expression after an opening `{{`; returns it and the text after `}}`.
fn split_expression<'t>(
    after_open: &'t str,
    template: &str,
) -> Result<(Reference, &'t str), PipelineError> {
    let end = after_open
        .find("}}")
        .ok_or_else(|| PipelineError::TemplateError {
            message: format!("Unclosed template expression in: {template}"),
        })?;
    let reference = parse_reference(after_open[..end].trim())?;
    Ok((reference, &after_open[end + 2..]))
}

fn parse_reference(expr: &str) -> Result<Reference, PipelineError> {
    let parts: Vec<&str> = expr.split('.').collect();
    match parts.as_slice() {
        ["input"] => Ok(Reference::Input),
        ["previous"] => Ok(Reference::Previous),
        ["steps", id] | ["steps", id, "output"] if !id.is_empty() => {
            Ok(Reference::Step(id.to_string()))
        }
        ["vars", name] if !name.is_empty() => Ok(Reference::Var(name.to_string())),
        _ => Err(PipelineError::TemplateError {
            message: format!("Unknown template reference '{expr}'"),
        }),
    }
}

fn resolve<'a>(reference: &Reference, ctx: &TemplateContext<'a>) -> Result<&'a str, PipelineError> {
    match reference {
        Reference::Input => Ok(ctx.input),
        Reference::Previous => Ok(ctx.previous),
        Reference::Step(id) => ctx
            .step_outputs
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::TemplateError {
                message: format!("Step '{id}' has no output"),
            }),
        Reference::Var(name) => ctx
            .vars
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::TemplateError {
                message: format!("Variable '{name}' is not set"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> HashMap<String, String> {
        HashMap::from([("retrieve".to_string(), "Passage 1".to_string())])
    }

    #[test]
    fn test_render_all_references() {
        let steps = outputs();
        let vars = HashMap::from([("language".to_string(), "Hindi".to_string())]);
        let ctx = TemplateContext {
            input: "wheat rust",
            previous: "draft",
            step_outputs: &steps,
            vars: &vars,
        };
        let rendered = render(
            "Q: {{ input }} | P: {{previous}} | C: {{ steps.retrieve }} | {{ steps.retrieve.output }} | L: {{ vars.language }}",
            &ctx,
        )
        .unwrap();
        assert_eq!(
            rendered,
            "Q: wheat rust | P: draft | C: Passage 1 | Passage 1 | L: Hindi"
        );
    }

    #[test]
    fn test_render_plain_text_unchanged() {
        let steps = HashMap::new();
        let vars = HashMap::new();
        let ctx = TemplateContext {
            input: "x",
            previous: "x",
            step_outputs: &steps,
            vars: &vars,
        };
        assert_eq!(render("no templates here", &ctx).unwrap(), "no templates here");
    }

    #[test]
    fn test_render_missing_step_output() {
        let steps = HashMap::new();
        let vars = HashMap::new();
        let ctx = TemplateContext {
            input: "x",
            previous: "x",
            step_outputs: &steps,
            vars: &vars,
        };
        let err = render("{{ steps.answer }}", &ctx).unwrap_err();
        assert!(err.to_string().contains("Step 'answer' has no output"));
    }

    #[test]
    fn test_unclosed_expression() {
        let err = references("Context: {{ steps.retrieve").unwrap_err();
        assert!(matches!(err, PipelineError::TemplateError { .. }));
    }

    #[test]
    fn test_unknown_reference() {
        assert!(references("{{ inputs.query }}").is_err());
        assert!(references("{{ steps. }}").is_err());
    }

    #[test]
    fn test_references_in_order() {
        let refs = references("{{ input }} then {{ steps.a }} then {{ previous }}").unwrap();
        assert_eq!(
            refs,
            vec![
                Reference::Input,
                Reference::Step("a".into()),
                Reference::Previous
            ]
        );
    }
}
