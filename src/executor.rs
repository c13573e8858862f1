use std::io::{self, Write};

use crate::builtins::{self, BuiltinAction};
use crate::command::{Pipeline, Sequence};
use crate::config::ShellConfig;
use crate::error::{ShellError, ValidationError};
use crate::job_control;
use crate::jobs::JobTable;
use crate::launcher;
use crate::pipes::PipeChain;
use crate::redirect::{self, ResolvedCommand};
use crate::signals::SignalBridge;
use crate::status::{self, WaitOutcome};

/// What the caller should do after a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading input; carries the pipeline's exit status.
    Continue(i32),
    /// `exit` was run.
    Exit(i32),
}

/// Result of launching one command of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Spawned(libc::pid_t),
    /// Never became a process (built-in, exec failure, bad redirect).
    Finished(i32),
}

/// One interactive shell: configuration, job table and signal bridge.
pub struct Session {
    config: ShellConfig,
    jobs: JobTable,
    bridge: SignalBridge,
}

impl Session {
    pub fn new(config: ShellConfig, bridge: SignalBridge) -> Self {
        let jobs = JobTable::new(config.limits.max_background);
        Self {
            config,
            jobs,
            bridge,
        }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Run every pipeline of a sequence in order, stopping early at `exit`.
    pub fn run_sequence(&mut self, sequence: Sequence) -> Flow {
        let mut last = Flow::Continue(0);
        for pipeline in sequence {
            self.poll_events();
            last = self.execute(pipeline);
            if let Flow::Exit(_) = last {
                break;
            }
        }
        last
    }

    /// Drain pending signal flags. Called between pipelines, never from a
    /// signal handler.
    pub fn poll_events(&mut self) {
        if self.bridge.take_interrupted() {
            log::debug!("interrupt delivered");
        }

        if self.bridge.take_continued() {
            log::debug!("shell continued");
        }

        if self.bridge.take_child_changed() {
            for done in self.jobs.reap() {
                println!("[{}] Done {}", done.index, done.display);
            }
        }
    }

    /// Run one pipeline to completion (foreground) or until launched
    /// (background). The pipeline is consumed.
    ///
    /// Validating → Launching → Waiting → Done. A validation failure goes
    /// straight to Done with nothing spawned.
    pub fn execute(&mut self, pipeline: Pipeline) -> Flow {
        log::trace!("validating: {}", pipeline.source());
        let resolved = match self.validate(&pipeline) {
            Ok(resolved) => resolved,
            Err(e) => {
                let err = ShellError::from(e);
                eprintln!("msh: {err}");
                return Flow::Continue(err.stage_status());
            }
        };

        self.jobs.begin_pipeline();
        self.bridge.clear();

        log::trace!("launching: {}", pipeline.source());
        let (stages, flow) = match self.launch(&pipeline, &resolved) {
            Ok(launched) => launched,
            Err(e) => {
                eprintln!("msh: {e}");
                return Flow::Continue(e.stage_status());
            }
        };

        if let Some(exit) = flow {
            return exit;
        }

        let status = if pipeline.is_background() {
            self.announce_background(&stages);
            stages.last().map_or(0, |stage| match stage {
                Stage::Spawned(_) => 0,
                Stage::Finished(code) => *code,
            })
        } else {
            log::trace!("waiting: {}", pipeline.source());
            self.wait_foreground(&stages, pipeline.source())
        };

        log::trace!("done: {}", pipeline.source());
        Flow::Continue(status)
    }

    /// Resolve every command before anything is launched, so a bad pipeline
    /// is rejected as a whole.
    fn validate(&self, pipeline: &Pipeline) -> Result<Vec<ResolvedCommand>, ValidationError> {
        let limits = &self.config.limits;
        if pipeline.len() > limits.max_commands {
            return Err(ValidationError::TooManyCommands {
                max: limits.max_commands,
            });
        }

        pipeline
            .commands()
            .iter()
            .map(|command| redirect::resolve(command, limits))
            .collect()
    }

    /// Launch left to right. Returns the stages launched so far and, if a
    /// built-in asked for it, the flow to return once they are dealt with.
    fn launch(
        &mut self,
        pipeline: &Pipeline,
        resolved: &[ResolvedCommand],
    ) -> Result<(Vec<Stage>, Option<Flow>), ShellError> {
        let mut chain = PipeChain::new(resolved.len())?;
        let mut stages = Vec::with_capacity(resolved.len());
        let background = pipeline.is_background();
        let display = pipeline.source();

        for command in resolved {
            let position = command.position;

            if builtins::is_builtin(command.program()) {
                chain.release(position);
                match self.run_builtin(command) {
                    BuiltinAction::Continue(code) => stages.push(Stage::Finished(code)),
                    BuiltinAction::Exit(code) => return Ok((stages, Some(Flow::Exit(code)))),
                    BuiltinAction::Foreground(job) => {
                        let code = self.wait_pids(&job.pids, &job.display);
                        stages.push(Stage::Finished(code));
                    }
                }
                continue;
            }

            let stdin = chain.take_stdin(position);
            let stdout = chain.take_stdout(position);
            match launcher::launch(command, stdin, stdout) {
                Ok(pid) => {
                    self.record(pid, display, background);
                    stages.push(Stage::Spawned(pid));
                }
                Err(e) if e.aborts_pipeline() => {
                    eprintln!("msh: {e}");
                    // Whatever already started is still ours to wait on.
                    stages.push(Stage::Finished(e.stage_status()));
                    break;
                }
                Err(e) => {
                    report_stage_error(command, &e);
                    stages.push(Stage::Finished(e.stage_status()));
                }
            }
        }

        Ok((stages, None))
    }

    fn record(&mut self, pid: libc::pid_t, display: &str, background: bool) {
        if !background {
            self.bridge.track(pid);
        }

        match self.jobs.register(pid, display, background) {
            Ok(Some(index)) => log::debug!("pid {pid} joined job [{index}]"),
            Ok(None) => {}
            Err(e) => eprintln!("msh: {e}"),
        }
    }

    /// Print the job announcement for a freshly launched background pipeline.
    fn announce_background(&self, stages: &[Stage]) {
        let Some(&Stage::Spawned(pid)) = stages
            .iter()
            .rev()
            .find(|stage| matches!(stage, Stage::Spawned(_)))
        else {
            return;
        };

        if let Some(job) = self.jobs.jobs().find(|job| job.pids.contains(&pid)) {
            println!("[{}] {pid}", job.index);
        }
    }

    fn run_builtin(&mut self, command: &ResolvedCommand) -> BuiltinAction {
        let program = command.program();
        let redirects = &command.redirects;

        let mut stdout: Box<dyn Write> = match redirects.stdout.as_ref().map(|r| r.open()) {
            Some(Ok(file)) => Box::new(file),
            Some(Err(e)) => {
                eprintln!("msh: {e}");
                return BuiltinAction::Continue(e.stage_status());
            }
            None => Box::new(io::stdout()),
        };
        let mut stderr: Box<dyn Write> = match redirects.stderr.as_ref().map(|r| r.open()) {
            Some(Ok(file)) => Box::new(file),
            Some(Err(e)) => {
                eprintln!("msh: {e}");
                return BuiltinAction::Continue(e.stage_status());
            }
            None => Box::new(io::stderr()),
        };

        let action = builtins::execute(
            program,
            command.args(),
            &mut *stdout,
            &mut *stderr,
            &mut self.jobs,
        );
        let _ = stdout.flush();
        action
    }

    fn wait_foreground(&mut self, stages: &[Stage], display: &str) -> i32 {
        let mut status = 0;
        for (n, stage) in stages.iter().enumerate() {
            match *stage {
                Stage::Finished(code) => status = code,
                Stage::Spawned(pid) => match self.wait_one(pid) {
                    Some(code) => status = code,
                    None => return self.suspend(display, &stages[n..]),
                },
            }
        }

        self.finish_wait();
        status
    }

    /// Block on a resumed job's pids, as `fg` does.
    fn wait_pids(&mut self, pids: &[libc::pid_t], display: &str) -> i32 {
        let stages: Vec<Stage> = pids.iter().map(|&pid| Stage::Spawned(pid)).collect();
        for &pid in pids {
            let _ = self.jobs.register(pid, display, false);
            self.bridge.track(pid);
        }
        self.wait_foreground(&stages, display)
    }

    /// Wait for one foreground pid. `None` means it was stopped.
    fn wait_one(&mut self, pid: libc::pid_t) -> Option<i32> {
        let code = match job_control::wait_for_pid(pid) {
            Ok(WaitOutcome::Exited(code)) => code,
            Ok(WaitOutcome::Stopped) => return None,
            Ok(WaitOutcome::Continued) => 0,
            Err(e) => {
                log::warn!("waitpid({pid}) failed: {e}");
                1
            }
        };

        log::debug!("pid {pid} exited with {code}");
        self.jobs.release_foreground(pid);
        self.bridge.untrack(pid);
        Some(code)
    }

    /// A foreground member stopped: the rest of the foreground set becomes a
    /// stopped background job.
    fn suspend(&mut self, display: &str, remaining: &[Stage]) -> i32 {
        log::debug!(
            "suspending {display} with {} stage(s) outstanding",
            remaining.len()
        );
        self.bridge.clear();
        match self.jobs.suspend_foreground(display) {
            Ok(index) => println!("\n[{index}] Stopped {display}"),
            Err(e) => eprintln!("msh: {e}"),
        }
        self.finish_wait();
        status::SUSPENDED
    }

    fn finish_wait(&mut self) {
        self.bridge.clear();
        self.bridge.take_suspended();
        if self.bridge.take_interrupted() {
            println!();
        }
    }
}

/// An exec failure belongs on the stage's own error stream, which may be a
/// `2>` target rather than the shell's stderr.
fn report_stage_error(command: &ResolvedCommand, err: &ShellError) {
    if let (ShellError::Exec { .. }, Some(redirect)) = (err, &command.redirects.stderr) {
        match redirect.open() {
            Ok(mut file) => {
                let _ = writeln!(file, "msh: {err}");
                return;
            }
            Err(open_err) => eprintln!("msh: {open_err}"),
        }
    }
    eprintln!("msh: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_pipeline, parse_sequence};

    fn session() -> Session {
        Session::new(ShellConfig::default(), SignalBridge::detached())
    }

    fn run(session: &mut Session, text: &str) -> Flow {
        session.run_sequence(parse_sequence(text).unwrap())
    }

    #[test]
    fn exit_status_is_last_stage() {
        let mut s = session();
        assert_eq!(run(&mut s, "true"), Flow::Continue(0));
        assert_eq!(run(&mut s, "false"), Flow::Continue(1));
        assert_eq!(run(&mut s, "false | true"), Flow::Continue(0));
        assert_eq!(run(&mut s, "true | false"), Flow::Continue(1));
    }

    #[test]
    fn unknown_program_is_127_and_shell_survives() {
        let mut s = session();
        assert_eq!(run(&mut s, "msh-no-such-program-xyz"), Flow::Continue(127));
        assert_eq!(run(&mut s, "true"), Flow::Continue(0));
    }

    #[test]
    fn failed_stage_does_not_block_siblings() {
        let mut s = session();
        assert_eq!(
            run(&mut s, "msh-no-such-program-xyz | wc -l"),
            Flow::Continue(0)
        );
    }

    #[test]
    fn exit_stops_the_sequence() {
        let mut s = session();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let line = format!("true ; exit ; echo x 1> {}", marker.display());
        assert_eq!(run(&mut s, &line), Flow::Exit(0));
        assert!(!marker.exists());
    }

    #[test]
    fn pipe_passes_bytes_through_to_redirect() {
        let mut s = session();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let line = format!("seq 1 5 | grep -v 3 | wc -l 1> {}", out.display());

        assert_eq!(run(&mut s, &line), Flow::Continue(0));
        assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "4");
    }

    #[test]
    fn append_keeps_existing_content() {
        let mut s = session();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("log.txt");
        std::fs::write(&out, "first\n").unwrap();

        let line = format!("echo second 1>> {}", out.display());
        assert_eq!(run(&mut s, &line), Flow::Continue(0));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn stderr_redirect() {
        let mut s = session();
        let dir = tempfile::tempdir().unwrap();
        let err = dir.path().join("err.txt");
        let line = format!("ls /nonexistent-dir-for-msh 2> {}", err.display());

        let Flow::Continue(code) = run(&mut s, &line) else {
            panic!("unexpected exit");
        };
        assert_ne!(code, 0);
        assert!(!std::fs::read_to_string(&err).unwrap().is_empty());
    }

    #[test]
    fn exec_failure_is_written_to_stderr_redirect() {
        let mut s = session();
        let dir = tempfile::tempdir().unwrap();
        let err = dir.path().join("err.txt");
        let line = format!("msh-no-such-program-xyz 2> {}", err.display());

        assert_eq!(run(&mut s, &line), Flow::Continue(127));
        assert_eq!(
            std::fs::read_to_string(&err).unwrap(),
            "msh: msh-no-such-program-xyz: command not found\n"
        );
    }

    #[test]
    fn exec_failure_appends_to_stderr_target() {
        let mut s = session();
        let dir = tempfile::tempdir().unwrap();
        let err = dir.path().join("err.txt");
        std::fs::write(&err, "earlier\n").unwrap();
        let line = format!("msh-no-such-program-xyz 2>> {}", err.display());

        assert_eq!(run(&mut s, &line), Flow::Continue(127));
        let logged = std::fs::read_to_string(&err).unwrap();
        assert!(logged.starts_with("earlier\n"), "err.txt was: {logged}");
        assert!(logged.ends_with("command not found\n"), "err.txt was: {logged}");
    }

    #[test]
    fn conflicting_redirect_rejects_whole_pipeline() {
        let mut s = session();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let marker = dir.path().join("marker");
        let line = format!(
            "touch {} | echo hi 1> {} | cat 1> {}",
            marker.display(),
            out.display(),
            out.display()
        );

        assert_eq!(run(&mut s, &line), Flow::Continue(2));
        assert!(!out.exists());
        assert!(!marker.exists(), "no stage may run when validation fails");
    }

    #[test]
    fn pipe_input_with_file_output_is_allowed() {
        let mut s = session();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let line = format!("echo hi | cat 1> {}", out.display());

        assert_eq!(run(&mut s, &line), Flow::Continue(0));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hi\n");
    }

    #[test]
    fn too_many_commands_is_rejected() {
        let mut config = ShellConfig::default();
        config.limits.max_commands = 2;
        let mut s = Session::new(config, SignalBridge::detached());
        assert_eq!(run(&mut s, "true | true | true"), Flow::Continue(2));
    }

    #[test]
    fn too_many_arguments_is_rejected() {
        let mut config = ShellConfig::default();
        config.limits.max_args = 1;
        let mut s = Session::new(config, SignalBridge::detached());
        assert_eq!(run(&mut s, "echo a b"), Flow::Continue(2));
    }

    #[test]
    fn background_pipeline_is_registered_not_waited() {
        let mut s = session();
        let started = std::time::Instant::now();
        assert_eq!(run(&mut s, "sleep 30 &"), Flow::Continue(0));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));

        assert_eq!(s.jobs().list(), vec![(0, "sleep 30")]);
        let pids = s.jobs().lookup(0).unwrap().pids.clone();
        assert_eq!(pids.len(), 1);

        for pid in pids {
            let _ = job_control::send_signal(pid, libc::SIGKILL);
            let _ = job_control::wait_for_pid(pid);
        }
    }

    #[test]
    fn fg_blocks_until_job_exits_and_removes_it() {
        let mut s = session();
        run(&mut s, "sleep 1 &");
        assert_eq!(s.jobs().list().len(), 1);

        let started = std::time::Instant::now();
        assert_eq!(run(&mut s, "fg 0"), Flow::Continue(0));
        assert!(started.elapsed() >= std::time::Duration::from_millis(500));
        assert!(s.jobs().list().is_empty());
    }

    #[test]
    fn fg_bad_index_does_not_block() {
        let mut s = session();
        assert_eq!(run(&mut s, "fg 3"), Flow::Continue(1));
        assert!(s.jobs().list().is_empty());
    }

    #[test]
    fn stopped_foreground_member_becomes_stopped_job() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stop-self");
        std::fs::write(&script, "#!/bin/sh\nkill -STOP $$\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut s = session();
        let pipeline = parse_pipeline(&script.display().to_string(), false).unwrap();
        assert_eq!(s.execute(pipeline), Flow::Continue(status::SUSPENDED));

        let job = s.jobs().lookup(0).unwrap().clone();
        assert_eq!(job.state, crate::jobs::JobState::Stopped);
        assert_eq!(job.pids.len(), 1);
        assert!(s.jobs().foreground().is_empty());

        for &pid in &job.pids {
            let _ = job_control::send_signal(pid, libc::SIGKILL);
            let _ = job_control::wait_for_pid(pid);
        }
    }
}
