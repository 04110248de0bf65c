#![forbid(unsafe_code)]

//! Compiles annotated source into the plain host language.

pub mod manifest;

pub use labelflow_annotate::{AnnotationGrammar, FAILED_CHECK, InstrumentConfig, RuntimeNames};

use miette::NamedSource;

#[derive(Clone, Debug, Default)]
pub struct CompileConfig {
    pub instrument: InstrumentConfig,
    /// Compiled ahead of every unit, with the same settings.
    pub prelude: Option<Prelude>,
}

/// Source shared by every compilation unit, such as label declarations.
#[derive(Clone, Debug)]
pub struct Prelude {
    pub name: String,
    pub source: String,
}

pub fn compile(src: &str, config: &CompileConfig) -> miette::Result<String> {
    compile_named("<input>", src, config)
}

/// Compiles one unit; diagnostics carry `name` and the offending source.
pub fn compile_named(name: &str, src: &str, config: &CompileConfig) -> miette::Result<String> {
    let grammar = AnnotationGrammar::with_config(config.instrument.clone());
    let mut out = String::new();
    if let Some(prelude) = &config.prelude {
        out.push_str(&compile_unit(&prelude.name, &prelude.source, &grammar)?);
    }
    out.push_str(&compile_unit(name, src, &grammar)?);
    Ok(out)
}

fn compile_unit(name: &str, src: &str, grammar: &AnnotationGrammar) -> miette::Result<String> {
    let program = labelflow_parse::parse_source_with(src, grammar)
        .map_err(|e| e.with_source_code(NamedSource::new(name, src.to_string())))?;
    tracing::debug!(
        unit = name,
        statements = program.body.len(),
        instrumented = grammar.config().enabled,
        "compiled unit"
    );
    Ok(labelflow_parse::format_program(&program))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_is_emitted_first() {
        let config = CompileConfig {
            instrument: InstrumentConfig::default(),
            prelude: Some(Prelude {
                name: "prelude.js".to_string(),
                source: "SecAnn <!Secret!>;".to_string(),
            }),
        };
        let out = compile("var x = 1 as <!Secret!>;", &config).unwrap();
        assert_eq!(
            out,
            "SecurityAnnotation.declare(\"Secret\");\nvar x = SecurityAnnotation.as(1, \"Secret\");\n"
        );
    }

    #[test]
    fn errors_name_the_failing_unit() {
        let config = CompileConfig {
            instrument: InstrumentConfig::default(),
            prelude: Some(Prelude {
                name: "prelude.js".to_string(),
                source: "SecAnn <!Secret;".to_string(),
            }),
        };
        let err = compile("var x;", &config).unwrap_err();
        assert!(err.to_string().contains("'!>'"), "{err}");
        let source = err.source_code().expect("source attached");
        let snippet = source
            .read_span(&(0, 6).into(), 0, 0)
            .expect("readable source");
        assert_eq!(snippet.name(), Some("prelude.js"));
    }
}
