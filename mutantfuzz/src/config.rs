//! Optional TOML config file providing defaults for any flag in
//! [`arg_parser`](crate::arg_parser). Grounded on `cargo-fuzzcheck`'s
//! `fuzzcheck.toml`: every field is optional and a flag on the command
//! line always wins over the config file.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub executable: Option<String>,
    pub fuzzer_cmd: Option<String>,
    pub budget: Option<f64>,
    pub time_per_mutant: Option<f64>,
    pub fraction_mutant: Option<f64>,
    pub order: Option<usize>,
    pub score: Option<bool>,

    pub only_mutate: Option<Vec<String>>,
    pub avoid_mutating: Option<Vec<String>>,
    pub mutate_standard_libraries: Option<bool>,
    pub source_include: Option<Vec<String>>,
    pub source_exclude: Option<Vec<String>>,

    pub reach_cmd: Option<String>,
    pub reach_timeout: Option<f64>,
    pub prune_cmd: Option<String>,
    pub prune_timeout: Option<f64>,
    pub initial_fuzz_cmd: Option<String>,
    pub initial_fuzz_budget: Option<f64>,
    pub post_initial_cmd: Option<String>,
    pub post_mutant_cmd: Option<String>,
    pub status_cmd: Option<String>,

    pub avoid_repeats: Option<bool>,
    pub repeat_retries: Option<usize>,

    pub save_mutants_dir: Option<String>,
    pub results_csv: Option<String>,
    pub unreachable_cache_file: Option<String>,
    pub disassembler: Option<String>,
    pub verbose: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &std::path::Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_partial_config() {
        let config: ConfigFile = toml::from_str(
            r#"
            executable = "/bin/target"
            budget = 120.5
            order = 2
            only_mutate = ["parse_", "decode_"]
            "#,
        )
        .unwrap();

        assert_eq!(config.executable.as_deref(), Some("/bin/target"));
        assert_eq!(config.budget, Some(120.5));
        assert_eq!(config.order, Some(2));
        assert_eq!(config.only_mutate, Some(vec!["parse_".to_string(), "decode_".to_string()]));
        assert_eq!(config.fuzzer_cmd, None);
    }

    #[test]
    fn an_empty_file_parses_to_all_defaults() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(config.executable, None);
        assert_eq!(config.verbose, None);
    }
}
