use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, bail};

const SEED_VAR: &str = "ORCHESTRA_SEED";
const TIME_LIMIT_VAR: &str = "ORCHESTRA_TIME_LIMIT";
const OUTPUT_VAR: &str = "ORCHESTRA_OUTPUT";
const HYPERPARAMETERS_VAR: &str = "ORCHESTRA_HYPERPARAMETERS";

/// A user supplied dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvSource {
    pub path: PathBuf,
    pub label: String,
}

/// How the walkthrough binary runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunConfig {
    pub seed: u64,
    /// In seconds in the environment.
    pub time_limit: Option<Duration>,
    /// Where fitted predictors are written.
    pub output: Option<PathBuf>,
    /// A JSON file with the hyperparameters, every backend zero-shot otherwise.
    pub hyperparameters: Option<PathBuf>,
    /// Runs on this CSV instead of the toy datasets.
    pub csv: Option<CsvSource>,
}

impl RunConfig {
    /// Reads the process environment and arguments.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::parse(|var| env::var(var).ok(), env::args().skip(1))
    }

    /// Builds the config from a variable lookup and the arguments after the program
    /// name, `[<csv> <label>]`.
    pub fn parse<F, I>(var: F, args: I) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
        I: IntoIterator<Item = String>,
    {
        let seed = match var(SEED_VAR) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{SEED_VAR} must be an unsigned integer, got '{raw}'"))?,
            None => 0,
        };

        let time_limit = match var(TIME_LIMIT_VAR) {
            Some(raw) => {
                let secs: f64 = raw
                    .parse()
                    .with_context(|| format!("{TIME_LIMIT_VAR} must be a number of seconds, got '{raw}'"))?;
                Some(
                    Duration::try_from_secs_f64(secs)
                        .with_context(|| format!("{TIME_LIMIT_VAR} must be non negative, got '{raw}'"))?,
                )
            }
            None => None,
        };

        let args: Vec<String> = args.into_iter().collect();
        let csv = match args.as_slice() {
            [] => None,
            [path, label] => Some(CsvSource {
                path: path.into(),
                label: label.clone(),
            }),
            _ => bail!("usage: tabular-orchestra [<csv> <label>]"),
        };

        Ok(Self {
            seed,
            time_limit,
            output: var(OUTPUT_VAR).map(PathBuf::from),
            hyperparameters: var(HYPERPARAMETERS_VAR).map(PathBuf::from),
            csv,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse(vars: &[(&str, &str)], args: &[&str]) -> anyhow::Result<RunConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunConfig::parse(|k| vars.get(k).cloned(), args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn defaults_without_anything_set() {
        assert_eq!(parse(&[], &[]).unwrap(), RunConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = parse(
            &[
                (SEED_VAR, "7"),
                (TIME_LIMIT_VAR, "1.5"),
                (OUTPUT_VAR, "out"),
                (HYPERPARAMETERS_VAR, "hp.json"),
            ],
            &["data.csv", "target"],
        )
        .unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.time_limit, Some(Duration::from_millis(1500)));
        assert_eq!(config.output, Some(PathBuf::from("out")));
        assert_eq!(config.hyperparameters, Some(PathBuf::from("hp.json")));
        assert_eq!(
            config.csv,
            Some(CsvSource {
                path: "data.csv".into(),
                label: "target".into()
            })
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&[(SEED_VAR, "-1")], &[]).is_err());
        assert!(parse(&[(TIME_LIMIT_VAR, "soon")], &[]).is_err());
        assert!(parse(&[(TIME_LIMIT_VAR, "-3")], &[]).is_err());
        assert!(parse(&[], &["only.csv"]).is_err());
    }
}
