//! Core Member
//!
//! Wires the apply pipeline, the allocation state machine, consensus and the
//! id generators of one cluster member.
//!
//! ## Responsibilities
//! - Open (or create) durable state under the data directory
//! - Recover: replay the committed log past the last flush on start
//! - Expose per-type id generators backed by cluster-wide allocation
//! - Shut down cleanly, flushing state

use std::fs;
use std::sync::Arc;

use crate::apply::{
    CommandApplicationProcess, CommitListener, CoreStateMachines, InFlightCache, SessionTracker,
    SessionTrackerMarshal, SessionTrackerState,
};
use crate::config::Config;
use crate::error::Result;
use crate::identity::MemberId;
use crate::id::{
    IdRangeAcquirer, IdReusabilityCondition, ReplicatedIdGeneratorFactory, ReplicatedIdRangeAcquirer, ReuseGate,
};
use crate::log::{FileRaftLog, InMemoryRaftLog, RaftLog};
use crate::replication::{ConsensusModule, LocalConsensus, RaftReplicator, Replicator};
use crate::state::{
    FileStateStorage, IdAllocationState, IdAllocationStateMarshal, InMemoryStateStorage, LongIndexMarshal,
    ReplicatedIdAllocationStateMachine, StateMarshal, StateStorage,
};

/// One member of a (single-member) cluster
pub struct CoreMember {
    me: MemberId,
    config: Config,
    log: Arc<dyn RaftLog>,
    id_allocation: Arc<ReplicatedIdAllocationStateMachine>,
    process: Arc<CommandApplicationProcess>,
    consensus: Arc<LocalConsensus>,
    replicator: Arc<RaftReplicator>,
    acquirer: Arc<ReplicatedIdRangeAcquirer>,
    reuse_condition: Arc<IdReusabilityCondition>,
    id_generators: ReplicatedIdGeneratorFactory,
}

struct Storages {
    id_allocation: Arc<dyn StateStorage<IdAllocationState>>,
    sessions: Arc<dyn StateStorage<SessionTrackerState>>,
    last_flushed: Arc<dyn StateStorage<i64>>,
}

impl CoreMember {
    // =========================================================================
    // State File Names
    // =========================================================================
    pub const ID_ALLOCATION_STATE: &'static str = "id-allocation";
    pub const SESSION_TRACKER_STATE: &'static str = "session-tracker";
    pub const LAST_FLUSHED_STATE: &'static str = "last-flushed";

    /// Open or create a member with durable state under `config.data_dir`
    ///
    /// The member is not applying yet; call [`CoreMember::start`].
    pub fn open(config: Config, me: MemberId) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        let state_dir = config.state_dir();

        let log = FileRaftLog::open(&config.log_path(), config.log_sync_strategy)?;
        let recovery = log.recovery_result();
        if recovery.entries_recovered > 0 || recovery.was_truncated {
            tracing::info!(
                entries_recovered = recovery.entries_recovered,
                last_index = recovery.last_index,
                was_truncated = recovery.was_truncated,
                "Recovered durable log"
            );
        }

        let storages = Storages {
            id_allocation: Arc::new(FileStateStorage::open(
                &state_dir,
                Self::ID_ALLOCATION_STATE,
                IdAllocationStateMarshal,
            )?),
            sessions: Arc::new(FileStateStorage::open(
                &state_dir,
                Self::SESSION_TRACKER_STATE,
                SessionTrackerMarshal,
            )?),
            last_flushed: Arc::new(FileStateStorage::open(
                &state_dir,
                Self::LAST_FLUSHED_STATE,
                LongIndexMarshal,
            )?),
        };

        Self::assemble(config, me, Arc::new(log), storages)
    }

    /// A member whose log and state live only in memory
    pub fn in_memory(config: Config, me: MemberId) -> Result<Self> {
        config.validate()?;
        let storages = Storages {
            id_allocation: Arc::new(InMemoryStateStorage::new(IdAllocationStateMarshal.start_state())),
            sessions: Arc::new(InMemoryStateStorage::new(SessionTrackerMarshal.start_state())),
            last_flushed: Arc::new(InMemoryStateStorage::new(LongIndexMarshal.start_state())),
        };
        Self::assemble(config, me, Arc::new(InMemoryRaftLog::new()), storages)
    }

    fn assemble(config: Config, me: MemberId, log: Arc<dyn RaftLog>, storages: Storages) -> Result<Self> {
        let cache = Arc::new(InFlightCache::new(
            config.in_flight_cache_enabled,
            config.in_flight_cache_max_entries,
            config.in_flight_cache_max_bytes,
        ));

        let id_allocation = Arc::new(ReplicatedIdAllocationStateMachine::new(storages.id_allocation)?);
        let state_machines = Arc::new(CoreStateMachines::new(Arc::clone(&id_allocation)));
        let sessions = SessionTracker::new(storages.sessions)?;

        let process = Arc::new(CommandApplicationProcess::new(
            Arc::clone(&log),
            Arc::clone(&cache),
            state_machines,
            sessions,
            storages.last_flushed,
            &config,
        ));

        let consensus = Arc::new(LocalConsensus::new(me, Arc::clone(&log), cache)?);
        consensus.add_commit_listener(Arc::clone(&process) as Arc<dyn CommitListener>);

        let reuse_condition = Arc::new(IdReusabilityCondition::new(
            me,
            Arc::clone(process.command_index_tracker()),
            consensus.leader_switches(),
        ));

        let replicator = Arc::new(RaftReplicator::new(
            me,
            Arc::clone(&consensus) as Arc<dyn ConsensusModule>,
            Arc::clone(process.progress_tracker()),
            Arc::clone(process.health()),
            config.replication_timeout,
        ));

        let acquirer = Arc::new(ReplicatedIdRangeAcquirer::new(
            me,
            Arc::clone(&replicator) as Arc<dyn Replicator>,
            Arc::clone(&id_allocation),
            &config,
        ));

        let id_generators = ReplicatedIdGeneratorFactory::new(
            Arc::clone(&acquirer) as Arc<dyn IdRangeAcquirer>,
            Arc::clone(&reuse_condition) as Arc<dyn ReuseGate>,
        );

        Ok(Self {
            me,
            config,
            log,
            id_allocation,
            process,
            consensus,
            replicator,
            acquirer,
            reuse_condition,
            id_generators,
        })
    }

    /// Start applying and replay whatever the log already holds
    pub fn start(&self) -> Result<()> {
        self.process.start()?;
        self.consensus.start();
        tracing::info!(member = %self.me, "Core member started");
        Ok(())
    }

    pub fn become_leader(&self) -> Result<()> {
        self.consensus.become_leader()
    }

    pub fn step_down(&self, leader: Option<MemberId>) {
        self.consensus.step_down(leader);
    }

    /// Close generators and stop the applier, flushing state
    pub fn close(self) -> Result<()> {
        self.id_generators.close_all();
        self.process.stop()?;
        tracing::info!(member = %self.me, "Core member closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn member_id(&self) -> MemberId {
        self.me
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log(&self) -> &Arc<dyn RaftLog> {
        &self.log
    }

    pub fn id_generators(&self) -> &ReplicatedIdGeneratorFactory {
        &self.id_generators
    }

    pub fn acquirer(&self) -> &Arc<ReplicatedIdRangeAcquirer> {
        &self.acquirer
    }

    pub fn replicator(&self) -> &Arc<RaftReplicator> {
        &self.replicator
    }

    pub fn process(&self) -> &Arc<CommandApplicationProcess> {
        &self.process
    }

    pub fn id_allocation(&self) -> &Arc<ReplicatedIdAllocationStateMachine> {
        &self.id_allocation
    }

    pub fn consensus(&self) -> &Arc<LocalConsensus> {
        &self.consensus
    }

    pub fn reuse_condition(&self) -> &Arc<IdReusabilityCondition> {
        &self.reuse_condition
    }
}
