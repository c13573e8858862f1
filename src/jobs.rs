use crate::error::ShellError;
use crate::job_control;
use crate::status::WaitOutcome;

/// The lifecycle state of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done(i32),
}

/// A background or stopped pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub index: usize,
    /// Member processes that have not been reaped yet.
    pub pids: Vec<libc::pid_t>,
    pub display: String,
    pub state: JobState,
    /// Insertion order, for "most recent job" defaults.
    seq: u64,
}

/// Where background registrations of the current pipeline are going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assembling {
    Nothing,
    Slot(usize),
    Untracked,
}

/// The shell's job table.
///
/// Background jobs live in fixed slots; a job's index is its slot, and a slot
/// is reused only after the job in it has been removed. The foreground set is
/// transient and holds the pids of the pipeline currently being waited on.
pub struct JobTable {
    slots: Vec<Option<Job>>,
    foreground: Vec<libc::pid_t>,
    /// Background processes that did not fit in the table. Reaped like jobs
    /// so they never linger as zombies.
    untracked: Vec<libc::pid_t>,
    assembling: Assembling,
    next_seq: u64,
}

impl JobTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            foreground: Vec::new(),
            untracked: Vec::new(),
            assembling: Assembling::Nothing,
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Start a new pipeline: forget the previous foreground set and stop
    /// adding to the previous background job.
    pub fn begin_pipeline(&mut self) {
        self.foreground.clear();
        self.assembling = Assembling::Nothing;
    }

    /// Record a freshly launched process.
    ///
    /// Background processes of one pipeline are grouped into a single job,
    /// whose index is returned. When the table is full the process keeps
    /// running untracked and `JobTableFull` is returned once per pipeline.
    pub fn register(
        &mut self,
        pid: libc::pid_t,
        display: &str,
        background: bool,
    ) -> Result<Option<usize>, ShellError> {
        if !background {
            self.foreground.push(pid);
            return Ok(None);
        }

        match self.assembling {
            Assembling::Slot(index) => {
                if let Some(job) = self.slots[index].as_mut() {
                    job.pids.push(pid);
                }
                Ok(Some(index))
            }
            Assembling::Untracked => {
                self.untracked.push(pid);
                Ok(None)
            }
            Assembling::Nothing => match self.insert(vec![pid], display, JobState::Running) {
                Ok(index) => {
                    self.assembling = Assembling::Slot(index);
                    Ok(Some(index))
                }
                Err(e) => {
                    self.untracked.push(pid);
                    self.assembling = Assembling::Untracked;
                    Err(e)
                }
            },
        }
    }

    /// Put a job into the first free slot.
    pub fn insert(
        &mut self,
        pids: Vec<libc::pid_t>,
        display: &str,
        state: JobState,
    ) -> Result<usize, ShellError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(ShellError::JobTableFull {
                capacity: self.capacity(),
            })?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots[index] = Some(Job {
            index,
            pids,
            display: display.to_string(),
            state,
            seq,
        });
        log::debug!("job [{index}] registered: {display}");
        Ok(index)
    }

    /// `(index, display)` for every background job, in slot order.
    pub fn list(&self) -> Vec<(usize, &str)> {
        self.jobs().map(|job| (job.index, job.display.as_str())).collect()
    }

    /// Every background job, in slot order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }

    pub fn lookup(&self, index: usize) -> Result<&Job, ShellError> {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(ShellError::JobNotFound { builtin: "job", index })
    }

    pub fn lookup_mut(&mut self, index: usize) -> Result<&mut Job, ShellError> {
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(ShellError::JobNotFound { builtin: "job", index })
    }

    /// Clear a slot, making it reusable.
    pub fn remove(&mut self, index: usize) -> Result<Job, ShellError> {
        let job = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(ShellError::JobNotFound { builtin: "job", index })?;

        if self.assembling == Assembling::Slot(index) {
            self.assembling = Assembling::Nothing;
        }
        Ok(job)
    }

    /// Index of the most recently inserted job.
    pub fn most_recent(&self) -> Option<usize> {
        self.jobs().max_by_key(|job| job.seq).map(|job| job.index)
    }

    /// Index of the most recently inserted stopped job.
    pub fn most_recent_stopped(&self) -> Option<usize> {
        self.jobs()
            .filter(|job| job.state == JobState::Stopped)
            .max_by_key(|job| job.seq)
            .map(|job| job.index)
    }

    pub fn foreground(&self) -> &[libc::pid_t] {
        &self.foreground
    }

    /// Drop a foreground pid once it has been waited for.
    pub fn release_foreground(&mut self, pid: libc::pid_t) {
        self.foreground.retain(|&p| p != pid);
    }

    /// Move whatever is left of the foreground set into a new stopped job.
    ///
    /// If the table is full the processes stay stopped but untracked.
    pub fn suspend_foreground(&mut self, display: &str) -> Result<usize, ShellError> {
        let pids = std::mem::take(&mut self.foreground);
        match self.insert(pids.clone(), display, JobState::Stopped) {
            Ok(index) => Ok(index),
            Err(e) => {
                self.untracked.extend(pids);
                Err(e)
            }
        }
    }

    /// Poll every tracked process without blocking.
    ///
    /// Updates Running/Stopped states, drops exited pids from their jobs, and
    /// removes and returns the jobs that have finished (state `Done`).
    pub fn reap(&mut self) -> Vec<Job> {
        let mut finished = Vec::new();

        for slot in self.slots.iter_mut() {
            let Some(job) = slot.as_mut() else {
                continue;
            };

            let index = job.index;
            let mut state = job.state;
            let mut last_code = None;
            job.pids.retain(|&pid| match job_control::poll_pid(pid) {
                Ok(Some(WaitOutcome::Exited(code))) => {
                    last_code = Some(code);
                    false
                }
                Ok(Some(WaitOutcome::Stopped)) => {
                    state = JobState::Stopped;
                    true
                }
                Ok(Some(WaitOutcome::Continued)) => {
                    state = JobState::Running;
                    true
                }
                Ok(None) => true,
                Err(e) => {
                    log::warn!("dropping pid {pid} from job [{index}]: {e}");
                    false
                }
            });
            job.state = state;

            if job.pids.is_empty() {
                if let Some(mut done) = slot.take() {
                    done.state = JobState::Done(last_code.unwrap_or(0));
                    log::debug!("job [{}] finished: {}", done.index, done.display);
                    finished.push(done);
                }
            }
        }

        if let Assembling::Slot(index) = self.assembling {
            if self.slots[index].is_none() {
                self.assembling = Assembling::Nothing;
            }
        }

        self.untracked.retain(|&pid| {
            !matches!(
                job_control::poll_pid(pid),
                Ok(Some(WaitOutcome::Exited(_))) | Err(_)
            )
        });

        finished
    }
}
