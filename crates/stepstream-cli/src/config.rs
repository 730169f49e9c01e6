use anyhow::{Context, bail};
use clap::Parser;
use serde::Deserialize;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    str::FromStr,
};
use stepstream::{EngineConfig, GenerateRequest, detect_config};

/// Command line arguments for the `stepstream` demo binary.
///
/// Jobs come either from repeated `--job` arguments or from a JSON job file.
/// With neither, the three classic demo jobs run concurrently.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "stepstream",
    version,
    about = "Streams concurrent echo jobs through a single stepstream engine"
)]
pub struct CliArgs {
    /// A job to run, written as `INTERVAL:PROMPT`. May be repeated.
    ///
    /// The prompt is echoed back one word every `INTERVAL` engine ticks.
    ///
    /// Example: `--job "2:you are so cool"`
    #[arg(long = "job", value_name = "INTERVAL:PROMPT")]
    pub jobs: Vec<JobSpec>,

    /// Directory containing a `config.json`, or the path of a JSON job file.
    ///
    /// The file holds `{ "jobs": [{ "prompt": "...", "interval": 1 }] }`.
    /// Cannot be combined with `--job`.
    ///
    /// Environment variable: `STEPSTREAM_CONFIG`
    #[arg(long, env = "STEPSTREAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log a debug event every N driver ticks. `0` disables tick logging.
    ///
    /// Environment variable: `LOG_EVERY_TICKS`
    #[arg(long, env = "LOG_EVERY_TICKS", default_value_t = 0)]
    pub log_every_ticks: u64,

    /// Keep the driver spinning while no job is active instead of parking it.
    ///
    /// Environment variable: `NO_PARK`
    #[arg(long, env = "NO_PARK", default_value_t = false)]
    pub no_park: bool,
}

/// One job as written on the command line or in a job file.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub prompt: String,
    pub interval: usize,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl JobSpec {
    fn new(interval: usize, prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            interval,
            request_id: None,
        }
    }
}

impl FromStr for JobSpec {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let Some((interval, prompt)) = raw.split_once(':') else {
            bail!("expected INTERVAL:PROMPT, got {raw:?}");
        };
        let interval = interval
            .trim()
            .parse::<usize>()
            .with_context(|| format!("invalid interval {interval:?}"))?;
        Ok(Self::new(interval, prompt))
    }
}

#[derive(Deserialize, Debug)]
struct JobFile {
    jobs: Vec<JobSpec>,
}

fn default_jobs() -> Vec<JobSpec> {
    vec![
        JobSpec::new(1, "hello world"),
        JobSpec::new(2, "you are so cool"),
        JobSpec::new(3, "good job guy"),
    ]
}

fn load_job_file(path: &Path) -> anyhow::Result<Vec<JobSpec>> {
    let path = detect_config(path)?;
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: JobFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(file.jobs)
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub jobs: Vec<GenerateRequest>,
    pub engine: EngineConfig,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let specs = match (args.jobs.is_empty(), args.config) {
            (false, Some(_)) => bail!("--job and --config cannot be combined"),
            (false, None) => args.jobs,
            (true, Some(path)) => load_job_file(&path)?,
            (true, None) => default_jobs(),
        };

        if specs.is_empty() {
            bail!("at least one job is required");
        }

        let mut seen = HashSet::new();
        let mut jobs = Vec::with_capacity(specs.len());
        for (n, spec) in specs.into_iter().enumerate() {
            if spec.interval == 0 {
                bail!("job {n}: interval must be greater than 0");
            }
            let request_id = spec.request_id.unwrap_or_else(|| format!("job-{n}"));
            if !seen.insert(request_id.clone()) {
                bail!("job {n}: duplicate request id {request_id:?}");
            }
            jobs.push(GenerateRequest::new(spec.prompt, spec.interval, request_id));
        }

        Ok(Self {
            jobs,
            engine: EngineConfig {
                park_when_idle: !args.no_park,
                log_every_ticks: args.log_every_ticks,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn run_config(argv: &[&str]) -> anyhow::Result<RunConfig> {
        let args = CliArgs::try_parse_from(std::iter::once("stepstream").chain(argv.iter().copied()))?;
        RunConfig::try_from(args)
    }

    #[test]
    fn job_specs_split_on_the_first_colon() {
        let spec: JobSpec = "2:you are so cool".parse().unwrap();
        assert_eq!(spec, JobSpec::new(2, "you are so cool"));

        let spec: JobSpec = " 1 :key: value".parse().unwrap();
        assert_eq!(spec, JobSpec::new(1, "key: value"));

        assert!("no interval".parse::<JobSpec>().is_err());
        assert!("x:hello".parse::<JobSpec>().is_err());
    }

    #[test]
    fn defaults_to_the_demo_jobs() {
        let config = run_config(&[]).unwrap();
        let prompts: Vec<_> = config
            .jobs
            .iter()
            .map(|job| (job.prompt.as_str(), job.interval, job.request_id.as_str()))
            .collect();
        assert_eq!(
            prompts,
            vec![
                ("hello world", 1, "job-0"),
                ("you are so cool", 2, "job-1"),
                ("good job guy", 3, "job-2"),
            ]
        );
        assert!(config.engine.park_when_idle);
        assert_eq!(config.engine.log_every_ticks, 0);
    }

    #[test]
    fn command_line_jobs_replace_the_defaults() {
        let config = run_config(&[
            "--job",
            "1:a b",
            "--job",
            "4:c",
            "--no-park",
            "--log-every-ticks",
            "10",
        ])
        .unwrap();
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[1], GenerateRequest::new("c", 4, "job-1"));
        assert!(!config.engine.park_when_idle);
        assert_eq!(config.engine.log_every_ticks, 10);
    }

    #[test]
    fn invalid_jobs_are_rejected() {
        assert!(run_config(&["--job", "0:never paced"]).is_err());
        assert!(run_config(&["--job", "1:a", "--config", "."]).is_err());
    }

    #[test]
    fn job_files_are_resolved_from_a_directory() {
        let dir = std::env::temp_dir().join(format!("stepstream-cli-jobs-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(stepstream::CONFIG_FILE_NAME),
            r#"{ "jobs": [
                { "prompt": "from a file", "interval": 2, "request_id": "file-job" },
                { "prompt": "second", "interval": 1 }
            ] }"#,
        )
        .unwrap();

        let config = run_config(&["--config", dir.to_str().unwrap()]).unwrap();
        assert_eq!(
            config.jobs,
            vec![
                GenerateRequest::new("from a file", 2, "file-job"),
                GenerateRequest::new("second", 1, "job-1"),
            ]
        );

        fs::write(
            dir.join(stepstream::CONFIG_FILE_NAME),
            r#"{ "jobs": [
                { "prompt": "a", "interval": 1, "request_id": "same" },
                { "prompt": "b", "interval": 1, "request_id": "same" }
            ] }"#,
        )
        .unwrap();
        assert!(run_config(&["--config", dir.to_str().unwrap()]).is_err());

        fs::remove_dir_all(&dir).unwrap();
        assert!(run_config(&["--config", dir.to_str().unwrap()]).is_err());
    }
}
