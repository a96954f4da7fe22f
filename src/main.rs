use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use qmstamp::config::{ConfigError, QmConfig};
use qmstamp::qm::{
    child_plans_for_master, put_asil_category, session_authentication, test_case_report, QmError,
};
use qmstamp::rules::{update_excel_wrt_rules, RuleError};
use qmstamp::sheet::columns::CHILD_TEST_PLAN;
use qmstamp::sheet::{write_xlsx, SheetError};
use qmstamp::watermark::{
    display_name, put_watermark, WatermarkError, WatermarkOptions, WatermarkStatus,
};

// ═══════════════════════════════════════════════════════════
// CLI types
// ═══════════════════════════════════════════════════════════

#[derive(Parser, Debug)]
#[command(name = "qmstamp", version, about = "QM test-plan automation and PDF watermarking")]
struct Cli {
    /// QM server base URL (overrides QMSTAMP_BASE_URL and the config file).
    #[arg(long, value_name = "URL", global = true)]
    base_url: Option<String>,

    /// JSON configuration file (overrides QMSTAMP_CONFIG).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stamp a watermark onto every PDF of a directory.
    Watermark(WatermarkCommand),
    /// Export the test cases of a master test plan to a spreadsheet.
    Fetch(FetchCommand),
    /// Apply the decision table to a spreadsheet and push the result to QM.
    Update(UpdateCommand),
}

#[derive(Args, Debug)]
struct WatermarkCommand {
    input: PathBuf,
    output: PathBuf,
    watermark: PathBuf,
    /// Footer text printed on every page.
    #[arg(long, conflicts_with = "user_details")]
    footer: Option<String>,
    /// File holding the name to print in the footer, followed by today's date.
    #[arg(long, value_name = "PATH")]
    user_details: Option<PathBuf>,
    /// Empty the output directory first.
    #[arg(long)]
    clean: bool,
}

#[derive(Args, Debug)]
struct FetchCommand {
    username: String,
    password: String,
    /// Master test plan identifier.
    mtp_id: String,
    output: PathBuf,
}

#[derive(Args, Debug)]
struct UpdateCommand {
    username: String,
    password: String,
    input: PathBuf,
    output: PathBuf,
    /// Write the derived columns without pushing anything to QM.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Qm(#[from] QmError),
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error(transparent)]
    Watermark(#[from] WatermarkError),
}

// ═══════════════════════════════════════════════════════════
// Entry point
// ═══════════════════════════════════════════════════════════

fn main() -> ExitCode {
    qmstamp::init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "qmstamp failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    match cli.command {
        Commands::Watermark(cmd) => watermark(cmd),
        Commands::Fetch(cmd) => fetch(cmd, &load_config(cli.config.as_deref(), cli.base_url)?),
        Commands::Update(cmd) => update(cmd, &load_config(cli.config.as_deref(), cli.base_url)?),
    }
}

fn load_config(path: Option<&Path>, base_url: Option<String>) -> Result<QmConfig, ConfigError> {
    let mut config = match path {
        Some(path) => QmConfig::load(path)?,
        None => QmConfig::from_env()?,
    };
    if let Some(url) = base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    Ok(config)
}

fn watermark(cmd: WatermarkCommand) -> Result<ExitCode, CliError> {
    let footer = match (cmd.footer, cmd.user_details) {
        (Some(text), _) => Some(text),
        (None, Some(path)) => Some(format!(
            "{} {}",
            display_name(&path)?,
            chrono::Local::now().format("%d.%m.%Y")
        )),
        (None, None) => None,
    };

    let options = WatermarkOptions {
        footer,
        clear_output: cmd.clean,
    };
    let status = put_watermark(&cmd.input, &cmd.output, &cmd.watermark, &options)?;
    tracing::info!(code = status.code(), "Watermark run finished");

    Ok(match status {
        WatermarkStatus::Success => ExitCode::SUCCESS,
        WatermarkStatus::Failure => ExitCode::FAILURE,
    })
}

fn fetch(cmd: FetchCommand, config: &QmConfig) -> Result<ExitCode, CliError> {
    let session = session_authentication(&config.base_url, &cmd.username, &cmd.password)?;

    let plans = child_plans_for_master(&cmd.mtp_id, &session, config)?;
    let plan_urls: Vec<String> = plans
        .column(CHILD_TEST_PLAN)?
        .into_iter()
        .map(str::to_string)
        .collect();

    let report = test_case_report(&plan_urls, &session, config)?;
    write_xlsx(&report, &cmd.output)?;

    tracing::info!(
        master_plan = %cmd.mtp_id,
        plans = plan_urls.len(),
        rows = report.len(),
        output = %cmd.output.display(),
        "Test case report written"
    );
    Ok(ExitCode::SUCCESS)
}

fn update(cmd: UpdateCommand, config: &QmConfig) -> Result<ExitCode, CliError> {
    let table = update_excel_wrt_rules(&cmd.input, &config.rules)?;
    write_xlsx(&table, &cmd.output)?;
    tracing::info!(
        rows = table.len(),
        output = %cmd.output.display(),
        "Derived classification written"
    );

    if cmd.dry_run {
        return Ok(ExitCode::SUCCESS);
    }

    let session = session_authentication(&config.base_url, &cmd.username, &cmd.password)?;
    let summary = put_asil_category(&session, &table, config)?;

    tracing::info!(
        updated = summary.updated.len(),
        skipped = summary.skipped.len(),
        "QM classifications pushed"
    );
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn update_takes_positional_arguments() {
        let cli = Cli::try_parse_from(["qmstamp", "update", "user", "pass", "in.xlsx", "out.xlsx"])
            .unwrap();
        match cli.command {
            Commands::Update(cmd) => {
                assert_eq!(cmd.username, "user");
                assert_eq!(cmd.input, PathBuf::from("in.xlsx"));
                assert!(!cmd.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn footer_and_user_details_conflict() {
        let result = Cli::try_parse_from([
            "qmstamp",
            "watermark",
            "in",
            "out",
            "logo.pdf",
            "--footer",
            "x",
            "--user-details",
            "u.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn base_url_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"base_url": "https://file.example/qm"}"#).unwrap();

        let config = load_config(Some(&path), Some("https://flag.example/qm/".into())).unwrap();
        assert_eq!(config.base_url, "https://flag.example/qm");
    }
}
