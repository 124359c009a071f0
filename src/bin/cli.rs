//! replicated-ids operator CLI
//!
//! Inspects persisted allocation state and the durable log, and allocates ids
//! through a single-member cluster over a data directory.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use replicated_ids::apply::{SessionTrackerMarshal, SessionTrackerState};
use replicated_ids::config::LogSyncStrategy;
use replicated_ids::log::{FileRaftLog, RaftLog};
use replicated_ids::protocol::{CoreCommand, ReplicatedContent};
use replicated_ids::state::{
    FileStateStorage, IdAllocationState, IdAllocationStateMarshal, LongIndexMarshal, StateStorage,
};
use replicated_ids::{Config, CoreMember, IdType, MemberId, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// replicated-ids CLI
#[derive(Parser, Debug)]
#[command(name = "replicated-ids")]
#[command(about = "Cluster-wide id allocation on a replicated log")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./replicated_ids_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the persisted allocation ledger and flush bookkeeping
    Inspect,

    /// List the entries of the durable log
    DumpLog {
        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Allocate ids through a single-member cluster
    Allocate {
        /// Id type name, e.g. node or relationship
        #[arg(short, long, default_value = "node")]
        id_type: String,

        /// Number of ids to allocate
        #[arg(short, long, default_value = "10")]
        count: usize,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,replicated_ids=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("replicated-ids v{}", replicated_ids::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .log_sync_strategy(LogSyncStrategy::EveryWrite)
        .build();

    let outcome = match args.command {
        Commands::Inspect => inspect(&config),
        Commands::DumpLog { limit } => dump_log(&config, limit),
        Commands::Allocate { id_type, count } => allocate(config, &id_type, count),
    };

    if let Err(e) = outcome {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

fn inspect(config: &Config) -> Result<()> {
    let state_dir = config.state_dir();

    let ledger: IdAllocationState =
        FileStateStorage::open(&state_dir, CoreMember::ID_ALLOCATION_STATE, IdAllocationStateMarshal)?.initial_state()?;
    let sessions: SessionTrackerState =
        FileStateStorage::open(&state_dir, CoreMember::SESSION_TRACKER_STATE, SessionTrackerMarshal)?.initial_state()?;
    let last_flushed: i64 = FileStateStorage::open(&state_dir, CoreMember::LAST_FLUSHED_STATE, LongIndexMarshal)?.initial_state()?;

    println!("last flushed command index: {}", last_flushed);
    println!("applied command index:      {}", ledger.applied_command_index());
    println!("session tracker log index:  {}", sessions.log_index());
    println!();
    println!("{:<30} {:>20}", "id type", "first unallocated");
    for id_type in IdType::ALL {
        println!("{:<30} {:>20}", id_type.name(), ledger.first_unallocated(id_type));
    }
    Ok(())
}

fn dump_log(config: &Config, limit: Option<usize>) -> Result<()> {
    let log = FileRaftLog::open(&config.log_path(), config.log_sync_strategy)?;
    let last = log.append_index();
    let limit = limit.unwrap_or(usize::MAX);

    for index in (0..=last).take(limit) {
        let entry = match log.read_entry(index)? {
            Some(entry) => entry,
            None => break,
        };
        let description = match &entry.content {
            ReplicatedContent::NewLeaderBarrier => "new leader barrier".to_string(),
            ReplicatedContent::Command(command) => describe(command),
            ReplicatedContent::Operation(operation) => format!(
                "{} (session {}/{}, seq {})",
                describe(&operation.command),
                operation.global_session.owner,
                operation.operation_id.local_session_id,
                operation.operation_id.sequence_number
            ),
        };
        println!("{:>8}  term {:<4} {}", entry.index, entry.term, description);
    }
    Ok(())
}

fn describe(command: &CoreCommand) -> String {
    match command {
        CoreCommand::IdAllocation(request) => format!(
            "allocate {} [{}, {}) for {}",
            request.id_type.name(),
            request.range_start,
            request.range_start + u64::from(request.range_length),
            request.owner
        ),
    }
}

fn allocate(config: Config, id_type: &str, count: usize) -> Result<()> {
    let id_type = IdType::from_name(id_type)
        .ok_or_else(|| replicated_ids::IdError::Config(format!("Unknown id type: {}", id_type)))?;

    let member = CoreMember::open(config, MemberId::random())?;
    member.start()?;

    // Replay the recovered log before proposing anything new
    let recovered = member.log().append_index();
    if !member.process().await_applied(recovered, Duration::from_secs(30))? {
        return Err(replicated_ids::IdError::Unhealthy(format!(
            "log replay did not reach index {}",
            recovered
        )));
    }
    member.become_leader()?;

    let generator = member.id_generators().open(id_type, 0);
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(generator.next_id()?);
    }
    println!("{}", ids.iter().map(u64::to_string).collect::<Vec<_>>().join(" "));

    member.close()
}
