//! `supervisor`
//!
//! Launches the drawing tool, follows its progress and cancels it.
//!
//! Only one plot runs at a time. A plot is started by [`Supervisor::start_job`], which stages a
//! private working copy of the design, launches the tool with its standard output and standard
//! error merged into one pipe, and hands that pipe to a background thread that feeds every line
//! through the [`crate::output`] rules into the shared [`JobState`]. Tools that give up straight
//! away (no plotter connected, bad arguments) are caught during a short grace period, so the
//! caller gets the failure back directly instead of having to poll for it.

use std::{
    fs,
    io::{self, BufRead, BufReader, PipeReader, Read},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

use serde::Serialize;
use tempfile::TempDir;

use crate::{
    command::{
        model_code, plot_command, preview_command, ManualCommand, PlotSettings, ToolCommand,
        UtilityCommand,
    },
    config::Config,
    distance::{estimate_distance_mm, estimate_seconds},
    error::JobError,
    files::sanitize_filename,
    job::{lock_child, JobState, RunningProcess},
    output::{classify_exit, parse_preview_report, ExitOutcome, OutputLog, ProgressSample},
    TOOL_NAME,
};

/// How long a freshly launched tool is given before checking whether it has already exited.
pub const START_GRACE_PERIOD: Duration = Duration::from_millis(200);
/// How long a cancelled tool is given to exit before it is killed.
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(3);
/// How long a preview run may take.
pub const PREVIEW_TIMEOUT: Duration = Duration::from_secs(60);
/// How often an exiting process is polled.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Prefix of the temporary directories holding working copies.
const WORKSPACE_PREFIX: &str = "plotterstudio_plot_";
/// Shown when the drawing tool cannot be launched.
const TOOL_HINT: &str = "set PLOTTERSTUDIO_NEXTDRAW to the full path";
/// Output reported for commands that were not run because of offline mode.
const OFFLINE_OUTPUT: &str = "offline mode: command logged but not executed";

/// The response to a started plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStarted {
    /// Always `true`, failures are errors.
    pub ok: bool,
    /// Process id of the tool, 0 when nothing was run.
    pub pid: u32,
    /// Name of the file being plotted.
    pub file: String,
    /// The command line that was launched.
    pub command: String,
    /// The page size the design was centred on.
    pub page: String,
    /// Set when the tool had already finished by the time this was returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// Set when the command was only logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline: Option<bool>,
    /// Output of a tool that had already finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// The response to a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cancelled {
    /// Whether a running tool was stopped.
    pub was_running: bool,
}

/// The captured result of a one-shot command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// The command line that was run.
    pub command: String,
    /// Exit code, negated signal number if the process was killed by a signal.
    pub code: i32,
    /// Trimmed standard output.
    pub stdout: String,
    /// Trimmed standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Standard output and standard error together.
    pub fn combined(&self) -> String {
        [self.stdout.as_str(), self.stderr.as_str()]
            .into_iter()
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Where a preview estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    /// The drawing tool's own preview report.
    Tool,
    /// Measured from the design.
    Estimate,
}

/// Expected duration and distance of a plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PreviewEstimate {
    /// Where the numbers came from.
    pub source: EstimateSource,
    /// Expected plot time.
    pub estimated_seconds: Option<f64>,
    /// Expected pen-down distance in mm.
    pub distance_mm: Option<f64>,
}

/// Runs the drawing tool on behalf of the server.
///
/// Cloning gives another handle to the same job.
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: Arc<Config>,
    job: JobState,
    /// Held while a job is being started, so two starts cannot both pass the conflict check.
    start_lock: Arc<Mutex<()>>,
}

impl Supervisor {
    /// Creates a supervisor with no job.
    pub fn new(config: Config) -> Self {
        Supervisor {
            config: Arc::new(config),
            job: JobState::new(),
            start_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared job record.
    pub fn job(&self) -> &JobState {
        &self.job
    }

    /// Starts plotting the design at `source`.
    ///
    /// # Arguments
    /// * `source`: The stored design. It is copied, the tool never sees the original.
    /// * `settings`: Plot settings.
    /// * `original_name`: Name to give the working copy, defaults to the name of `source`.
    ///
    /// # Returns
    /// Details of the launched job. `completed` is set if the tool finished during the grace
    /// period.
    ///
    /// # Errors
    /// * [`JobError::Conflict`] if a job is running, in which case the job is left alone.
    /// * [`JobError::NotFound`] if `source` does not exist.
    /// * [`JobError::ToolNotFound`] if the drawing tool cannot be launched.
    /// * [`JobError::ToolExecution`] if the tool failed during the grace period.
    pub fn start_job(
        &self,
        source: &Path,
        settings: &PlotSettings,
        original_name: Option<&str>,
    ) -> Result<JobStarted, JobError> {
        let _starting = self
            .start_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.job.lock().is_running() {
            return Err(JobError::Conflict);
        }
        if !source.is_file() {
            return Err(JobError::NotFound(source.to_path_buf()));
        }
        self.job.lock().error = None;

        let name = match original_name {
            Some(name) => name.to_string(),
            None => source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let workspace = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()?;
        let working_copy = workspace.path().join(sanitize_filename(&name)?);
        fs::copy(source, &working_copy)?;

        let page = settings.page_size();
        let plotted = if self.config.offline {
            working_copy
        } else {
            self.centre_on_page(&working_copy, page.as_str())
        };
        let file = plotted
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let tool = plot_command(&self.config.tool_command, &plotted, settings);
        let command = tool.to_string();
        log::info!("Launching {TOOL_NAME}: {command}");

        let started = JobStarted {
            ok: true,
            pid: 0,
            file: file.clone(),
            command,
            page: page.as_str().to_string(),
            completed: None,
            offline: None,
            output: None,
        };

        if self.config.offline {
            log::info!("Offline mode: command not executed");
            self.record_offline_job(&file, &plotted, settings, workspace);
            return Ok(JobStarted {
                completed: Some(true),
                offline: Some(true),
                output: Some(OFFLINE_OUTPUT.to_string()),
                ..started
            });
        }

        let (child, reader) = spawn_merged(&tool)?;
        let pid = child.id();
        let child = Arc::new(Mutex::new(child));
        let (generation, needs_distance) =
            self.record_launch(&file, pid, &child, settings, workspace);

        if needs_distance {
            if let Some(distance_mm) = estimate_distance_mm(&plotted) {
                let mut job = self.job.lock();
                if job.generation == generation && job.distance_mm.is_none() {
                    job.distance_mm = Some(distance_mm);
                }
            }
        }

        thread::sleep(START_GRACE_PERIOD);
        let status = lock_child(&child).try_wait()?;
        let Some(status) = status else {
            let job = self.job.clone();
            thread::Builder::new()
                .name(format!("{TOOL_NAME}-{pid}"))
                .spawn(move || watch_progress(&job, generation, &child, reader))?;
            return Ok(JobStarted { pid, ..started });
        };

        let code = exit_code(status);
        let output = drain(reader);
        let outcome = classify_exit(code, &output);
        {
            let mut job = self.job.lock();
            if job.owns(generation) {
                job.finish(&outcome);
                job.elapsed_override = None;
            }
        }

        match outcome {
            ExitOutcome::Completed => {
                log::info!("{TOOL_NAME} completed immediately with code 0");
                Ok(JobStarted {
                    pid,
                    completed: Some(true),
                    output: (!output.is_empty()).then_some(output),
                    ..started
                })
            }
            ExitOutcome::Failed(message) => {
                log::error!("{TOOL_NAME} exited immediately with code {code}: {message}");
                Err(JobError::ToolExecution { output: message })
            }
        }
    }

    /// Runs the page centering utility over `working_copy`.
    ///
    /// # Returns
    /// The centred copy, or `working_copy` itself if centering is disabled or failed.
    fn centre_on_page(&self, working_copy: &Path, page: &str) -> PathBuf {
        let Some(program) = self.config.centering_command.as_deref() else {
            return working_copy.to_path_buf();
        };
        let stem = working_copy
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let centred = working_copy.with_file_name(format!("{stem}-fixed.svg"));

        let result = Command::new(program)
            .arg("read")
            .arg(working_copy)
            .args(["write", "--page-size", page, "--center"])
            .arg(&centred)
            .stdin(Stdio::null())
            .output();
        match result {
            Ok(output) if output.status.success() && centred.is_file() => centred,
            Ok(output) => {
                log::warn!(
                    "{program} exited with {}; falling back to original SVG",
                    output.status
                );
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    log::debug!("{program} stderr: {}", stderr.trim());
                }
                working_copy.to_path_buf()
            }
            Err(err) => {
                log::warn!("{program} could not be run ({err}); skipping centering step");
                working_copy.to_path_buf()
            }
        }
    }

    /// Resets the job for a freshly launched process.
    ///
    /// # Returns
    /// The new generation, and whether the distance still needs estimating.
    fn record_launch(
        &self,
        file: &str,
        pid: u32,
        child: &Arc<Mutex<Child>>,
        settings: &PlotSettings,
        workspace: TempDir,
    ) -> (u64, bool) {
        let mut job = self.job.lock();
        job.generation += 1;
        let generation = job.generation;
        job.process = Some(RunningProcess {
            generation,
            pid,
            child: Arc::clone(child),
        });
        if job.file.as_deref() != Some(file) {
            job.distance_mm = None;
        }
        job.file = Some(file.to_string());
        job.progress = Some(0.0);
        job.started_at = Some(Instant::now());
        job.ended_at = None;
        job.elapsed_override = None;
        job.device_model.clone_from(&settings.model);
        job.workspace = Some(workspace);
        (generation, job.distance_mm.is_none())
    }

    /// Records a job that was only logged, as if it had completed instantly.
    fn record_offline_job(
        &self,
        file: &str,
        plotted: &Path,
        settings: &PlotSettings,
        workspace: TempDir,
    ) {
        let known_distance = {
            let job = self.job.lock();
            job.distance_mm.filter(|_| job.file.as_deref() == Some(file))
        };
        let distance_mm = known_distance.or_else(|| estimate_distance_mm(plotted));

        let mut job = self.job.lock();
        let now = Instant::now();
        job.generation += 1;
        job.process = None;
        job.file = Some(file.to_string());
        job.progress = Some(100.0);
        job.started_at = Some(now);
        job.ended_at = Some(now);
        job.elapsed_override = Some(0.0);
        job.distance_mm = distance_mm;
        job.error = None;
        job.device_model.clone_from(&settings.model);
        job.workspace = Some(workspace);
    }

    /// Stops the running job, if any.
    ///
    /// The job is detached before the process is signalled, so nothing the process prints from
    /// then on is recorded. Progress, the reported elapsed time and any error are cleared even
    /// when nothing was running. After stopping a running tool the pen is raised and the motors
    /// released, failures of which are only logged.
    pub fn cancel(&self) -> Cancelled {
        let process = {
            let mut job = self.job.lock();
            let process = job.process.take();
            job.progress = None;
            job.ended_at = Some(Instant::now());
            job.elapsed_override = None;
            job.error = None;
            process
        };

        let Some(process) = process.filter(RunningProcess::is_alive) else {
            log::debug!("Cancel requested with no running job");
            return Cancelled { was_running: false };
        };

        log::info!("Cancelling {TOOL_NAME} (pid {})", process.pid);
        if !terminate(&mut lock_child(&process.child), process.pid) {
            log::debug!("{TOOL_NAME} (pid {}) had already exited", process.pid);
        }

        for command in [ManualCommand::RaisePen, ManualCommand::DisableMotors] {
            match self.run_manual(command, None) {
                Ok(output) if output.success() => {}
                Ok(output) => log::warn!(
                    "'{command}' after cancel exited with code {}: {}",
                    output.code,
                    output.combined()
                ),
                Err(err) => log::warn!("'{command}' after cancel failed: {err}"),
            }
        }
        Cancelled { was_running: true }
    }

    /// Runs a utility-mode command.
    ///
    /// # Arguments
    /// * `command`: The command to run.
    /// * `model`: Plotter model, defaults to the current job's and then the configured one.
    ///
    /// # Errors
    /// [`JobError::ToolNotFound`] if the drawing tool cannot be launched. A command that runs
    /// and fails is not an error, check [`CommandOutput::success`].
    pub fn run_utility(
        &self,
        command: UtilityCommand,
        model: Option<&str>,
    ) -> Result<CommandOutput, JobError> {
        let code = model_code(self.resolve_model(model).as_deref());
        self.run_tool(&command.command(&self.config.tool_command, code))
    }

    /// Runs a manual-mode command.
    ///
    /// # Errors
    /// As for [`Supervisor::run_utility`].
    pub fn run_manual(
        &self,
        command: ManualCommand,
        model: Option<&str>,
    ) -> Result<CommandOutput, JobError> {
        let code = model_code(self.resolve_model(model).as_deref());
        self.run_tool(&command.command(&self.config.tool_command, code))
    }

    /// Works out how long the design at `svg` would take to plot, and how far the pen would go.
    ///
    /// The tool's own preview report is used when it gives one, otherwise the numbers are
    /// estimated from the design.
    ///
    /// # Errors
    /// [`JobError::NotFound`] if `svg` does not exist.
    pub fn preview(
        &self,
        svg: &Path,
        settings: &PlotSettings,
    ) -> Result<PreviewEstimate, JobError> {
        if !svg.is_file() {
            return Err(JobError::NotFound(svg.to_path_buf()));
        }

        let (mut seconds, mut distance_mm) = if self.config.offline {
            log::info!("Offline mode: skipping preview run for {}", svg.display());
            (None, None)
        } else {
            self.preview_with_tool(svg, settings)
        };

        let source = if seconds.is_some() || distance_mm.is_some() {
            EstimateSource::Tool
        } else {
            EstimateSource::Estimate
        };
        if distance_mm.is_none() {
            distance_mm = estimate_distance_mm(svg);
        }
        if source == EstimateSource::Estimate {
            seconds = distance_mm.map(|distance| estimate_seconds(distance, settings.speed_down));
        }

        Ok(PreviewEstimate {
            source,
            estimated_seconds: seconds,
            distance_mm,
        })
    }

    /// Asks the drawing tool for its preview report.
    fn preview_with_tool(
        &self,
        svg: &Path,
        settings: &PlotSettings,
    ) -> (Option<f64>, Option<f64>) {
        let model = settings
            .model
            .as_deref()
            .filter(|model| !model.is_empty())
            .or(self.config.default_model.as_deref());
        let tool = preview_command(&self.config.tool_command, svg, settings, model);
        log::debug!("Running {TOOL_NAME} preview: {tool}");

        let (code, output) = match run_with_timeout(&tool, PREVIEW_TIMEOUT) {
            Ok(Some(result)) => result,
            Ok(None) => {
                log::warn!("{TOOL_NAME} preview timed out for {}", svg.display());
                return (None, None);
            }
            Err(err) => {
                log::warn!("{TOOL_NAME} preview could not be run: {err}");
                return (None, None);
            }
        };

        let (seconds, distance_mm) = parse_preview_report(&output);
        if code != 0 && seconds.is_none() && distance_mm.is_none() {
            log::warn!("{TOOL_NAME} preview failed with code {code}: {}", output.trim());
        }
        #[allow(clippy::cast_precision_loss)]
        let seconds = seconds.map(|seconds| seconds as f64);
        (seconds, distance_mm)
    }

    /// Model for a one-shot command: the given one, else the job's, else the configured default.
    fn resolve_model(&self, model: Option<&str>) -> Option<String> {
        model
            .filter(|model| !model.is_empty())
            .map(str::to_string)
            .or_else(|| self.job.device_model())
            .or_else(|| self.config.default_model.clone())
    }

    /// Runs a one-shot command to completion.
    fn run_tool(&self, tool: &ToolCommand) -> Result<CommandOutput, JobError> {
        log::info!("Running {TOOL_NAME} command: {tool}");
        if self.config.offline {
            log::info!("Offline mode: skipping command execution");
            return Ok(CommandOutput {
                command: tool.to_string(),
                code: 0,
                stdout: OFFLINE_OUTPUT.to_string(),
                stderr: String::new(),
            });
        }

        let output = tool
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|err| launch_error(err, tool))?;
        let result = CommandOutput {
            command: tool.to_string(),
            code: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };
        if result.success() {
            log::debug!("{TOOL_NAME} command output: {}", result.combined());
        } else {
            log::warn!(
                "{TOOL_NAME} command exited with code {}: {}",
                result.code,
                result.combined()
            );
        }
        Ok(result)
    }
}

/// Turns a failure to launch the tool into a [`JobError`].
fn launch_error(err: io::Error, tool: &ToolCommand) -> JobError {
    if err.kind() == io::ErrorKind::NotFound {
        log::error!("{TOOL_NAME} binary not found: {}", tool.program());
        JobError::ToolNotFound {
            program: tool.program().to_string(),
            hint: TOOL_HINT,
        }
    } else {
        JobError::Io(err)
    }
}

/// Launches `tool` with standard output and standard error merged into one pipe.
fn spawn_merged(tool: &ToolCommand) -> Result<(Child, PipeReader), JobError> {
    let (reader, writer) = io::pipe()?;
    let mut command = tool.to_command();
    command
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    let child = command.spawn().map_err(|err| launch_error(err, tool))?;
    // The command holds the write end, it has to go for the reader to ever see the end.
    drop(command);
    Ok((child, reader))
}

/// Reads everything left in the pipe and keeps the last lines of it.
fn drain(mut reader: PipeReader) -> String {
    let mut bytes = Vec::new();
    if let Err(err) = reader.read_to_end(&mut bytes) {
        log::warn!("Failed to read {TOOL_NAME} output: {err}");
    }
    let mut log = OutputLog::default();
    log.extend_from_text(&String::from_utf8_lossy(&bytes));
    log.text()
}

/// Runs `tool` with merged output, killing it if it runs for longer than `timeout`.
///
/// # Returns
/// The exit code and output, or `None` on timeout.
fn run_with_timeout(
    tool: &ToolCommand,
    timeout: Duration,
) -> Result<Option<(i32, String)>, JobError> {
    let (mut child, mut reader) = spawn_merged(tool)?;
    let output = thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = reader.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    };

    let output = output.join().unwrap_or_default();
    Ok(status.map(|status| (exit_code(status), output)))
}

/// Follows a running tool until it exits, recording progress and the final outcome.
///
/// Runs on its own thread. Every write is made only while the job still belongs to
/// `generation`; once the job has been cancelled or replaced the thread stops quietly.
fn watch_progress(job: &JobState, generation: u64, child: &Mutex<Child>, reader: PipeReader) {
    let mut log = OutputLog::default();
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                log::warn!("Failed to read {TOOL_NAME} output: {err}");
                break;
            }
        }

        let text = String::from_utf8_lossy(&buffer);
        // Progress bars redraw with carriage returns.
        for line in text.split(['\r', '\n']).map(str::trim) {
            if line.is_empty() {
                continue;
            }
            log::debug!("{TOOL_NAME}: {line}");
            log.push(line);
            let sample = ProgressSample::from_line(line);
            if !sample.is_empty() && !job.apply_sample(generation, &sample) {
                log::debug!("Job {generation} was detached, no longer following its output");
                return;
            }
        }
    }

    let Some(code) = wait_for_exit(job, generation, child) else {
        return;
    };
    let outcome = classify_exit(code, &log.text());
    match &outcome {
        ExitOutcome::Completed => log::info!("{TOOL_NAME} finished"),
        ExitOutcome::Failed(message) => {
            log::error!("{TOOL_NAME} exited with code {code}: {message}");
        }
    }
    job.finish(generation, &outcome);
}

/// Waits for the process of `generation` to exit.
///
/// # Returns
/// The exit code, or `None` if the job was detached in the meantime.
fn wait_for_exit(job: &JobState, generation: u64, child: &Mutex<Child>) -> Option<i32> {
    loop {
        if !job.lock().owns(generation) {
            return None;
        }
        match lock_child(child).try_wait() {
            Ok(Some(status)) => return Some(exit_code(status)),
            Ok(None) => {}
            Err(err) => {
                log::error!("Failed to wait for {TOOL_NAME}: {err}");
                return Some(-1);
            }
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

/// Asks the process to stop, then kills it if it has not stopped within [`CANCEL_TIMEOUT`].
///
/// The caller holds the child's lock, so nothing else can reap it and free `pid` for reuse
/// between the check below and the signal.
///
/// # Returns
/// `false` if the process had already exited and was not signalled.
fn terminate(child: &mut Child, pid: u32) -> bool {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return false;
    }
    if let Err(err) = request_stop(child, pid) {
        log::warn!("Failed to signal {TOOL_NAME} (pid {pid}): {err}");
    }

    let deadline = Instant::now() + CANCEL_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL_INTERVAL),
            Ok(None) | Err(_) => break,
        }
    }

    log::warn!("{TOOL_NAME} (pid {pid}) did not stop, killing it");
    if let Err(err) = child.kill() {
        log::error!("Failed to kill {TOOL_NAME} (pid {pid}): {err}");
    }
    let _ = child.wait();
    true
}

/// Sends SIGTERM so the tool can lift the pen and shut down cleanly.
#[cfg(unix)]
fn request_stop(child: &mut Child, pid: u32) -> io::Result<()> {
    let status = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => Ok(()),
        _ => child.kill(),
    }
}

/// There is no gentler way to stop a process here.
#[cfg(not(unix))]
fn request_stop(child: &mut Child, _pid: u32) -> io::Result<()> {
    child.kill()
}

/// The exit code of a process, the negated signal number if a signal ended it.
fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_supervisor() -> Supervisor {
        Supervisor::new(Config {
            tool_command: vec!["nextdraw".to_string()],
            offline: true,
            default_model: Some("AxiDraw MiniKit".to_string()),
            ..Config::default()
        })
    }

    #[test]
    fn test_offline_utility_command() {
        let output = offline_supervisor()
            .run_utility(UtilityCommand::WalkX(5.0), None)
            .unwrap();
        assert!(output.success());
        assert_eq!(output.command, "nextdraw -L4 -m utility -M walk_mmx --dist 5");
        assert_eq!(output.stdout, OFFLINE_OUTPUT);
    }

    #[test]
    fn test_model_resolution_order() {
        let supervisor = offline_supervisor();
        assert_eq!(
            supervisor.resolve_model(None).as_deref(),
            Some("AxiDraw MiniKit")
        );
        supervisor.job.lock().device_model = Some("AxiDraw SE/A1".to_string());
        assert_eq!(
            supervisor.resolve_model(None).as_deref(),
            Some("AxiDraw SE/A1")
        );
        assert_eq!(supervisor.resolve_model(Some("3")).as_deref(), Some("3"));
        assert_eq!(
            supervisor.resolve_model(Some("")).as_deref(),
            Some("AxiDraw SE/A1")
        );
    }

    #[test]
    fn test_offline_plot_completes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("square.svg");
        fs::write(
            &source,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10mm" height="10mm" viewBox="0 0 10 10"><rect width="10" height="10" stroke="black" fill="none"/></svg>"#,
        )
        .unwrap();

        let supervisor = offline_supervisor();
        let started = supervisor
            .start_job(&source, &PlotSettings::default(), None)
            .unwrap();
        assert_eq!(started.completed, Some(true));
        assert_eq!(started.offline, Some(true));
        assert_eq!(started.file, "square.svg");
        assert_eq!(started.page, "a5");
        assert!(started.command.starts_with("nextdraw "));

        let status = supervisor.job().snapshot();
        assert!(!status.running);
        assert_eq!(status.progress, Some(100.0));
        assert_eq!(status.elapsed_seconds, Some(0.0));
        let distance = status.distance_mm.unwrap();
        assert!((distance - 40.0).abs() < 0.01, "{distance}");
    }

    #[test]
    fn test_offline_preview_falls_back_to_estimate() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("line.svg");
        fs::write(
            &source,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100mm" height="10mm" viewBox="0 0 100 10"><path d="M0 5 H70" stroke="black"/></svg>"#,
        )
        .unwrap();

        let settings = PlotSettings {
            speed_down: 100,
            ..PlotSettings::default()
        };
        let preview = offline_supervisor().preview(&source, &settings).unwrap();
        assert_eq!(preview.source, EstimateSource::Estimate);
        let distance = preview.distance_mm.unwrap();
        assert!((distance - 70.0).abs() < 0.01, "{distance}");
        let seconds = preview.estimated_seconds.unwrap();
        assert!((seconds - 2.0).abs() < 0.01, "{seconds}");
    }

    #[cfg(unix)]
    #[test]
    fn test_exited_process_is_not_signalled() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let started = Instant::now();
        assert!(!terminate(&mut child, pid));
        assert!(started.elapsed() < CANCEL_TIMEOUT);
    }

    #[cfg(unix)]
    #[test]
    fn test_stubborn_process_is_killed() {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; while :; do sleep 1; done"])
            .spawn()
            .unwrap();
        let pid = child.id();
        // Give the shell time to install its trap.
        thread::sleep(Duration::from_millis(200));

        let started = Instant::now();
        assert!(terminate(&mut child, pid));
        let elapsed = started.elapsed();
        assert!(elapsed >= CANCEL_TIMEOUT, "{elapsed:?}");
        assert!(elapsed < CANCEL_TIMEOUT + Duration::from_secs(3), "{elapsed:?}");
        assert!(matches!(child.try_wait(), Ok(Some(_))), "process still running");
    }

    #[test]
    fn test_missing_design() {
        let supervisor = offline_supervisor();
        let missing = Path::new("/no/such/design.svg");
        assert!(matches!(
            supervisor.start_job(missing, &PlotSettings::default(), None),
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(
            supervisor.preview(missing, &PlotSettings::default()),
            Err(JobError::NotFound(_))
        ));
    }
}
