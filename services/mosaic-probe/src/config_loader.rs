//! Loads mosaic descriptions from YAML files with environment substitution.
//!
//! `${VAR}` is replaced by the variable's value and fails when it is unset;
//! `${VAR:-default}` falls back to `default` when the variable is unset or empty.

use std::path::Path;

use anyhow::{Context, Result};
use grid_mosaic::MosaicDescription;
use tracing::debug;

/// Read, expand and parse a mosaic description.
pub fn load_description(path: &Path) -> Result<MosaicDescription> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read description {}", path.display()))?;
    let expanded = expand_env_vars(&content)
        .with_context(|| format!("Failed to expand variables in {}", path.display()))?;
    let description = MosaicDescription::from_yaml_str(&expanded)
        .with_context(|| format!("Failed to parse description {}", path.display()))?;
    debug!(
        path = %path.display(),
        grids = description.grids.len(),
        queries = description.queries.len(),
        "Loaded mosaic description"
    );
    Ok(description)
}

// ============================================================================
// Environment variable expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` references.
pub fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            let mut depth = 1;
            while depth > 0 {
                match chars.next() {
                    Some('{') => {
                        depth += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        depth -= 1;
                        if depth > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use test_utils::{write_fixture, CUBE_MOSAIC};

    #[test]
    #[serial]
    fn test_expand_env_vars_simple() {
        std::env::set_var("MOSAIC_PROBE_TEST_DIM", "7");
        let result = expand_env_vars("dims: [${MOSAIC_PROBE_TEST_DIM}]").unwrap();
        assert_eq!(result, "dims: [7]");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("MOSAIC_PROBE_UNSET");
        let result = expand_env_vars("ndims: ${MOSAIC_PROBE_UNSET:-2}").unwrap();
        assert_eq!(result, "ndims: 2");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("MOSAIC_PROBE_REQUIRED");
        assert!(expand_env_vars("${MOSAIC_PROBE_REQUIRED}").is_err());
    }

    #[test]
    fn test_expand_env_vars_unclosed() {
        assert!(expand_env_vars("ndims: ${NDIMS").is_err());
    }

    #[test]
    fn test_plain_dollar_is_kept() {
        assert_eq!(expand_env_vars("cost: $5").unwrap(), "cost: $5");
    }

    #[test]
    fn test_load_description_from_file() {
        let (_dir, path) = write_fixture("cube.yaml", CUBE_MOSAIC).unwrap();
        let description = load_description(&path).unwrap();
        assert_eq!(description.ndims, 3);
        assert_eq!(description.grids.len(), 1);
        assert_eq!(description.queries.len(), 1);
    }

    #[test]
    #[serial]
    fn test_load_description_with_substitution() {
        std::env::remove_var("MOSAIC_PROBE_EXTENT");
        let yaml = "ndims: 1\ngrids:\n  - { name: line, dims: [${MOSAIC_PROBE_EXTENT:-5}] }\n";
        let (_dir, path) = write_fixture("line.yaml", yaml).unwrap();
        let description = load_description(&path).unwrap();
        assert_eq!(description.grids[0].dims, vec![5]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_description(Path::new("/nonexistent/mosaic.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read description"));
    }
}
