//! Subcommands of the `hashflow` binary.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use tracing::{info, warn};
use uuid::Uuid;

use hashflow_core::{
    daily_index, daily_levels, evaluate, fingerprint, generator, palette, DailyDifficulty, Level,
    LevelId, Operation,
};
use hashflow_ledger::{
    EdgeFunctionMinter, InMemoryLedger, NftMinter, PostgrestLedger, RemoteLedger,
};
use hashflow_session::{GameSession, RunOutcome, SessionConfig};

/// HashFlow CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show a campaign or daily level
    Level {
        /// Level ID
        id: LevelId,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List a day's challenge levels
    Daily {
        /// Difficulty (easy, normal, hard)
        difficulty: DailyDifficulty,
        /// Date (YYYY-MM-DD), today if omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Evaluate a pipeline locally
    Eval {
        /// Level ID
        #[arg(short, long)]
        level: LevelId,
        /// Operations, e.g. `shl:2 xor:92`
        #[arg(required = true, value_parser = parse_op)]
        ops: Vec<Operation>,
    },

    /// Suggest candidate operations
    Palette {
        /// Level ID
        #[arg(short, long)]
        level: LevelId,
        /// Current conveyor value, the level input if omitted
        #[arg(long)]
        current: Option<u32>,
    },

    /// Run a pipeline through the full ledger protocol
    Submit {
        /// Level ID
        #[arg(short, long)]
        level: LevelId,
        /// Operations, e.g. `shl:2 xor:92`
        #[arg(required = true, value_parser = parse_op)]
        ops: Vec<Operation>,
    },
}

/// Connection settings from flags and environment.
#[derive(Debug, Clone, Default)]
pub struct Connection {
    pub access_token: Option<String>,
    pub player_id: Option<Uuid>,
}

/// Parse `xor:<mask>` or `shl:<bits>`.
pub fn parse_op(raw: &str) -> Result<Operation, String> {
    let (kind, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected <op>:<value>, got '{}'", raw))?;
    let value: u32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid value in '{}'", raw))?;
    match kind.trim().to_ascii_lowercase().as_str() {
        "xor" => Ok(Operation::xor(value)),
        "shl" | "shift_left" => Ok(Operation::shift_left(value)),
        other => Err(format!("unknown operation '{}' (use xor or shl)", other)),
    }
}

/// Campaign level, or today's daily level for a daily ID.
pub fn resolve_level(id: LevelId, today: NaiveDate) -> anyhow::Result<Level> {
    if let Some(level) = generator::level(id) {
        return Ok(level.clone());
    }
    let (difficulty, index) = daily_index(id).ok_or_else(|| anyhow!("No level with ID {}", id))?;
    daily_levels(today, difficulty)
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow!("No daily level with ID {}", id))
}

/// Execute a command and return its printable output.
pub async fn execute_command(
    command: Commands,
    config: SessionConfig,
    connection: Connection,
) -> anyhow::Result<String> {
    let today = Utc::now().date_naive();

    match command {
        Commands::Level { id, json } => {
            let level = resolve_level(id, today)?;
            if json {
                Ok(serde_json::to_string_pretty(&level)?)
            } else {
                Ok(format_level(&level))
            }
        }

        Commands::Daily { difficulty, date } => {
            let date = date.unwrap_or(today);
            let levels = daily_levels(date, difficulty);
            let mut out = format!("{} daily, {}\n", difficulty.display_name(), date);
            out.push_str(difficulty.description());
            out.push('\n');
            for level in &levels {
                out.push('\n');
                out.push_str(&format_level(level));
            }
            Ok(out)
        }

        Commands::Eval { level, ops } => {
            let level = resolve_level(level, today)?;
            Ok(format_evaluation(&level, &ops))
        }

        Commands::Palette { level, current } => {
            let level = resolve_level(level, today)?;
            let current = current.unwrap_or(level.input);
            let lines: Vec<String> = palette(current, level.target, level.id)
                .iter()
                .map(|c| format!("{:<10} {}", c.operation.to_string(), if c.is_winning { "wins" } else { "" }))
                .collect();
            Ok(lines.join("\n"))
        }

        Commands::Submit { level, ops } => submit(config, connection, resolve_level(level, today)?, ops).await,
    }
}

async fn submit(
    config: SessionConfig,
    connection: Connection,
    level: Level,
    ops: Vec<Operation>,
) -> anyhow::Result<String> {
    let player_id = connection.player_id.unwrap_or_else(Uuid::new_v4);
    let endpoint = config.ledger.endpoint(connection.access_token.clone());

    let (ledger, minter): (Arc<dyn RemoteLedger>, Option<Arc<dyn NftMinter>>) = match endpoint {
        Some(endpoint) => {
            let minter = EdgeFunctionMinter::new(endpoint.clone(), config.ledger.mint_function.clone())
                .context("Failed to build mint client")?;
            let ledger = PostgrestLedger::new(endpoint).context("Failed to build ledger client")?;
            let ledger: Arc<dyn RemoteLedger> = Arc::new(ledger);
            let minter: Arc<dyn NftMinter> = Arc::new(minter);
            (ledger, Some(minter))
        }
        None => {
            warn!("No ledger configured, playing against an in-memory ledger");
            let ledger: Arc<dyn RemoteLedger> = Arc::new(InMemoryLedger::new().with_exclusivity(config.exclusivity));
            (ledger, None)
        }
    };
    info!(player_id = %player_id, ledger = ledger.id(), level_id = level.id, "Submitting pipeline");

    let mut session = GameSession::new(player_id, config, ledger);
    if let Some(minter) = minter {
        session = session.with_minter(minter);
    }
    if let Some(advisory) = session.bootstrap(Utc::now()).await {
        println!("{}", advisory);
    }

    let coordinator = session
        .open_level(level, Utc::now())
        .await
        .map_err(|e| anyhow!(e.notice().unwrap_or_else(|| e.to_string())))?;
    for op in ops {
        coordinator.push(op).await?;
    }

    let outcome = match coordinator.run(Utc::now()).await {
        Ok(outcome) => outcome,
        Err(e) => bail!(e.notice().unwrap_or_else(|| e.to_string())),
    };

    let mut out = describe_outcome(&outcome);
    let economy = session.economy().await;
    if let (Some(moves), Some(credits)) = (economy.moves, economy.credits) {
        out.push_str(&format!("\nMoves left: {}, credits: {}", moves, credits));
    }
    let progression = session.progression().await;
    out.push_str(&format!(
        "\nRespect: {} ({})",
        progression.progress().total_respect,
        progression.rank()
    ));
    Ok(out)
}

fn binary(value: u32) -> String {
    format!("{:032b}", value)
}

fn format_level(level: &Level) -> String {
    let mut out = format!(
        "#{} {}\n{}\n  input:    {:>10}  {}\n  target:   {:>10}  {}\n  reward:   {} respect\n  conveyor: {} nodes",
        level.id,
        level.name,
        level.description,
        level.input,
        binary(level.input),
        level.target,
        binary(level.target),
        level.reward_respect,
        level.conveyor_length,
    );
    if !level.is_daily() {
        out.push_str(&format!("\n  category: {}", level.category().display_name()));
    }
    if let Some(hint) = level.legend_hint() {
        out.push_str(&format!("\n  legend:   {}", hint));
    }
    out.push('\n');
    out
}

fn format_evaluation(level: &Level, ops: &[Operation]) -> String {
    let evaluation = evaluate(level.input, ops);
    let mut out = evaluation.trace.join("\n");
    out.push('\n');
    out.push_str(&evaluation.verdict(level.target));
    if let Some(fp) = fingerprint(ops) {
        out.push_str(&format!("\ncanonical: {}\nhash:      {}", fp.raw_canonical_form, fp.hash));
    }
    out
}

fn describe_outcome(outcome: &RunOutcome) -> String {
    let headline = match outcome {
        RunOutcome::Completed { fingerprint, award, .. } => {
            let mut line = format!("Unique solution registered ({})", fingerprint.hash);
            for entry in &award.breakdown {
                line.push_str(&format!("\n  {}", entry));
            }
            if let Some(difficulty) = award.daily_completed {
                line.push_str(&format!("\n  {} daily complete", difficulty.display_name()));
            }
            line
        }
        RunOutcome::Duplicate { fingerprint } => format!("Duplicate pipeline ({})", fingerprint.hash),
        RunOutcome::Miss { evaluation } => evaluation.trace.join("\n"),
        RunOutcome::EmptyPipeline => "Empty pipeline".to_string(),
        RunOutcome::OutOfResources(_) => "Run declined".to_string(),
        RunOutcome::Unresolved { cause } => format!("Unresolved: {}", cause),
    };
    match outcome.notice() {
        Some(notice) => format!("{}\n{}", headline, notice),
        None => headline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_op() {
        assert_eq!(parse_op("xor:92"), Ok(Operation::xor(92)));
        assert_eq!(parse_op("SHL:2"), Ok(Operation::shift_left(2)));
        assert_eq!(parse_op("shl:40"), Ok(Operation::shift_left(31)));
        assert!(parse_op("rot:1").is_err());
        assert!(parse_op("xor").is_err());
        assert!(parse_op("xor:-1").is_err());
    }

    #[test]
    fn test_resolve_level() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(resolve_level(1, today).unwrap().target, 224);
        assert_eq!(resolve_level(10_201, today).unwrap().id, 10_201);
        assert!(resolve_level(5_000, today).is_err());
    }

    #[test]
    fn test_format_evaluation() {
        let level = generator::level_for(1);
        let out = format_evaluation(&level, &[Operation::shift_left(2), Operation::xor(92)]);
        assert!(out.contains("Target reached!"));
        assert!(out.contains(r#"{"operations":[{"op":"shift_left","value":2},{"op":"xor","value":92}]}"#));
    }

    #[tokio::test]
    async fn test_offline_submit() {
        let out = execute_command(
            Commands::Submit {
                level: 1,
                ops: vec![Operation::shift_left(2), Operation::xor(92)],
            },
            SessionConfig::default(),
            Connection::default(),
        )
        .await
        .unwrap();
        assert!(out.starts_with("Unique solution registered"));
        assert!(out.contains("Moves left: 49"));
    }
}
