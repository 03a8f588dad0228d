//! Command-line surface: `-logConfig <path>` plus one or more trailing
//! config file arguments (or `-`/`STDIN` for standard input). Mirrors
//! `cmd/konvahti/cliparams.go`.

use clap::Parser;

const EXTRA_HELP: &str = "\
Environment variables:
  KONVAHTI_LOG_LEVEL
        The lowest priority level logs to include in the log output:
        trace, debug, info, warn, error, fatal, panic, disabled

  KONVAHTI_LOG_ENABLEPRETTYLOGGING
        When set to 'true', use text log output instead of JSON.

  KONVAHTI_LOG_OUTPUTSTREAM
        Stream to write logs to: stdout, stderr.
        Default: stderr

  KONVAHTI_LOG_TIMESTAMPFIELDNAME
        Name of the timestamp field in JSON log output.";

#[derive(Debug, Parser)]
#[command(name = "konvahti", after_help = EXTRA_HELP)]
pub struct Cli {
    /// Location of the log configuration file
    #[arg(long = "logConfig")]
    pub log_config: Option<String>,

    /// Location of the konvahti configuration files. Pass "-" to read
    /// configuration from STDIN.
    #[arg(required = true)]
    pub config_files: Vec<String>,
}

/// `-` and `STDIN` both mean "read this configuration from standard input",
/// matching the original's case-insensitive-free check (it only ever
/// compares against those two exact spellings).
pub fn is_stdin(config_file_name: &str) -> bool {
    matches!(config_file_name, "-" | "STDIN")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_stdin_matches_dash_and_stdin_literal() {
        assert!(is_stdin("-"));
        assert!(is_stdin("STDIN"));
        assert!(!is_stdin("stdin"));
        assert!(!is_stdin("config.yaml"));
    }

    #[test]
    fn parses_multiple_config_files_and_log_config_flag() {
        let cli = Cli::parse_from([
            "konvahti",
            "-logConfig",
            "logconfig.yaml",
            "config1.yaml",
            "config2.yaml",
        ]);
        assert_eq!(cli.log_config.as_deref(), Some("logconfig.yaml"));
        assert_eq!(cli.config_files, vec!["config1.yaml", "config2.yaml"]);
    }

    #[test]
    fn requires_at_least_one_config_file() {
        let result = Cli::try_parse_from(["konvahti"]);
        assert!(result.is_err());
    }
}
