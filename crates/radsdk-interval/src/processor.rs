//! Processor for interval count links
//!
//! The device streams data reports on its own for as long as the link is
//! read. Each report lists single events by channel, so there is no
//! device-side elapsed time: reports are stamped with the host time their
//! chunk arrived, and real time is measured on the host.

use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use radsdk_core::acquisition::{Attribution, Component, RunState};
use radsdk_core::framing::{ImplicitSize, Reassembler};
use radsdk_core::listener::{broadcast_error, ComponentListener, ListenerTable};
use radsdk_core::query::{ConfigQuery, QueryState};
use radsdk_core::rolling_queue::RollingQueue;
use radsdk_core::time::ticks_to_ms;
use radsdk_core::worker::Worker;
use radsdk_core::{
    Clock, DataInterface, DataProcessor, DataSink, Endian, Error, ErrorCode, ProcessorConfig,
    Result,
};

use crate::protocol::{self, component, IntervalCounts, DATA_REPORT, REPORT_LEN};

struct State {
    reassembler: Reassembler<ImplicitSize>,
    queue: RollingQueue,
    thread: RunState,
    /// Bumped for every processing thread spawned
    epoch: u64,
    detector: Component,
    configuration: Component,
    /// Tick the current detector run started at
    run_start: i64,
    query: ConfigQuery,
}

impl State {
    fn component_mut(&mut self, id: u8) -> Option<&mut Component> {
        match id {
            component::DETECTOR => Some(&mut self.detector),
            component::CONFIGURATION => Some(&mut self.configuration),
            _ => None,
        }
    }

    fn component(&self, id: u8) -> Option<&Component> {
        match id {
            component::DETECTOR => Some(&self.detector),
            component::CONFIGURATION => Some(&self.configuration),
            _ => None,
        }
    }

    fn any_running(&self) -> bool {
        self.detector.status() == RunState::Running
            || self.configuration.status() == RunState::Running
    }

    /// Length of the detector run so far, or of the last one if stopped
    fn update_run_time(&mut self, now: i64) {
        let end = match self.detector.status() {
            RunState::Running => now,
            _ => self.detector.start_stop_ts(),
        };
        self.detector.set_run_ms(ticks_to_ms(end - self.run_start));
    }
}

struct Shared {
    interface: Arc<dyn DataInterface>,
    clock: Arc<dyn Clock>,
    config: ProcessorConfig,
    state: Mutex<State>,
    data_ready: Condvar,
    query_done: Condvar,
    finish_done: Condvar,
    listeners: Mutex<ListenerTable>,
    worker: Worker,
}

/// Interval count stream processor
pub struct IntervalProcessor {
    shared: Arc<Shared>,
}

impl IntervalProcessor {
    pub fn new(
        interface: Arc<dyn DataInterface>,
        clock: Arc<dyn Clock>,
        config: ProcessorConfig,
    ) -> Self {
        let state = State {
            reassembler: Reassembler::new(ImplicitSize::new(REPORT_LEN, protocol::report_len)),
            queue: RollingQueue::new(config.rolling_queue_entries, REPORT_LEN),
            thread: RunState::Stopped,
            epoch: 0,
            detector: Component::new(),
            configuration: Component::new(),
            run_start: 0,
            query: ConfigQuery::new(REPORT_LEN),
        };
        let shared = Arc::new(Shared {
            interface,
            clock,
            config,
            state: Mutex::new(state),
            data_ready: Condvar::new(),
            query_done: Condvar::new(),
            finish_done: Condvar::new(),
            listeners: Mutex::new(ListenerTable::new()),
            worker: Worker::new(),
        });
        let sink = Arc::downgrade(&shared);
        let sink: Weak<dyn DataSink> = sink;
        shared.interface.set_sink(Some(sink));
        Self { shared }
    }

    pub fn thread_state(&self) -> RunState {
        self.shared.state.lock().thread
    }

    pub fn component_state(&self, id: u8) -> Option<RunState> {
        self.shared.state.lock().component(id).map(Component::status)
    }

    /// Reports waiting to be processed
    pub fn queued_reports(&self) -> usize {
        self.shared.state.lock().queue.len()
    }
}

impl Drop for IntervalProcessor {
    fn drop(&mut self) {
        self.shared.interface.set_sink(None);
        let was_running = {
            let mut state = self.shared.state.lock();
            state.detector.settle();
            state.configuration.settle();
            let was_running = state.thread.is_active();
            state.thread = RunState::Stopped;
            was_running
        };
        if was_running {
            if let Err(e) = self.shared.interface.stop_reading() {
                log::warn!("interval: failed to stop transport: {}", e);
            }
        }
        self.shared.data_ready.notify_all();
        self.shared.worker.join();
    }
}

impl DataSink for Shared {
    fn on_data(&self, data: &[u8]) {
        self.queue_data(data);
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        self.raise_error(code, message);
    }
}

impl Shared {
    fn queue_data(&self, chunk: &[u8]) {
        let timestamp = self.clock.now_ticks();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let queue = &mut state.queue;
        let mut overwritten = 0usize;
        let report = state
            .reassembler
            .push(chunk, &mut |head: &[u8], tail: &[u8]| {
                if queue.is_full() {
                    overwritten += 1;
                }
                queue.enqueue_parts(timestamp, head, tail)
            });
        if report.delivered > 0 {
            self.data_ready.notify_one();
        }
        drop(guard);

        if overwritten > 0 {
            log::debug!("interval: queue full, {} oldest reports lost", overwritten);
        }
        if report.discarded > 0 {
            log::warn!(
                "interval: discarded {} bytes with no known report id",
                report.discarded
            );
        }
    }

    fn raise_error(&self, code: ErrorCode, message: &str) {
        let active = self.state.lock().detector.is_active();
        if !active {
            return;
        }
        let listeners = self.listeners.lock().snapshot([component::DETECTOR]);
        broadcast_error(&listeners, code, message);
    }

    fn start(self: &Arc<Self>, id: u8) -> Result<()> {
        let (spawn, resume, epoch) = {
            let mut state = self.state.lock();
            self.flush_finish(&mut state, id)?;
            let now = self.clock.now_ticks();
            let c = state.component_mut(id).ok_or(Error::InvalidComponent(id))?;
            if !c.begin(now) {
                return Ok(());
            }
            if id == component::DETECTOR {
                state.run_start = now;
            }
            let previous = state.thread;
            state.thread = RunState::Running;
            if previous == RunState::Stopped {
                state.reassembler.reset();
                state.queue.clear();
                state.epoch = state.epoch.wrapping_add(1);
            }
            (
                previous == RunState::Stopped,
                previous == RunState::Finishing,
                state.epoch,
            )
        };
        log::debug!("interval: start processing component 0x{:02X}", id);

        if spawn || resume {
            if let Err(e) = self.interface.begin_reading() {
                log::error!("interval: failed to start transport: {}", e);
                self.abort_start(id);
                return Err(e);
            }
        }
        if spawn {
            let shared = Arc::clone(self);
            if let Err(e) = self.worker.spawn("interval-processor", move || shared.run(epoch)) {
                self.abort_start(id);
                if let Err(e) = self.interface.stop_reading() {
                    log::warn!("interval: failed to stop transport: {}", e);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Deliver, or wait out, the finished callback still owed for `id`'s
    /// last run
    fn flush_finish(&self, state: &mut MutexGuard<'_, State>, id: u8) -> Result<()> {
        loop {
            let c = state.component_mut(id).ok_or(Error::InvalidComponent(id))?;
            if let Some(forced) = c.claim_finish() {
                MutexGuard::unlocked(state, || self.notify_finished(id, forced));
                if let Some(c) = state.component_mut(id) {
                    c.finish_delivered();
                }
                self.finish_done.notify_all();
            } else if c.finish_in_flight() {
                self.finish_done.wait(state);
            } else {
                return Ok(());
            }
        }
    }

    /// Deliver the finished callback owed to `id`, unless a restart already
    /// has
    fn deliver_finish(&self, id: u8) {
        let forced = {
            let mut state = self.state.lock();
            match state.component_mut(id).and_then(|c| c.claim_finish()) {
                Some(forced) => forced,
                None => return,
            }
        };
        self.notify_finished(id, forced);
        let mut state = self.state.lock();
        if let Some(c) = state.component_mut(id) {
            c.finish_delivered();
        }
        self.finish_done.notify_all();
    }

    fn notify_finished(&self, id: u8, forced: bool) {
        let listener = self.listeners.lock().get(id);
        if let Some(l) = listener {
            l.on_finished(forced);
        }
    }

    fn abort_start(&self, id: u8) {
        let mut state = self.state.lock();
        let now = self.clock.now_ticks();
        if let Some(c) = state.component_mut(id) {
            c.end(true, now);
        }
        if id == component::DETECTOR {
            state.detector.set_run_ms(0);
        }
        if !state.any_running() {
            state.thread = RunState::Stopped;
        }
    }

    fn stop(&self, id: u8, force: bool) -> Result<()> {
        let (stop_thread, handle) = {
            let mut state = self.state.lock();
            let now = self.clock.now_ticks();
            let c = state.component_mut(id).ok_or(Error::InvalidComponent(id))?;
            let was_running = c.status() == RunState::Running;
            if !c.end(force, now) {
                return Ok(());
            }
            if force {
                c.owe_finish(true);
            }
            if id == component::DETECTOR && was_running {
                state.update_run_time(now);
            }
            let stop_thread = state.thread.is_active()
                && !state.any_running()
                && !state.query.is_waiting();
            let mut join = false;
            if stop_thread {
                // A draining detector keeps the thread finishing
                join = force && state.detector.status() != RunState::Finishing;
                state.thread = if join {
                    RunState::Stopped
                } else {
                    RunState::Finishing
                };
            }
            (stop_thread, join.then(|| self.worker.take()).flatten())
        };
        log::debug!(
            "interval: stop processing component 0x{:02X} (force: {})",
            id,
            force
        );

        if stop_thread {
            if let Err(e) = self.interface.stop_reading() {
                log::warn!("interval: failed to stop transport: {}", e);
            }
            self.data_ready.notify_all();
            if let Some(handle) = handle {
                Worker::wait(handle);
            }
        }

        if force {
            self.deliver_finish(id);
        }
        Ok(())
    }

    fn run(&self, epoch: u64) {
        log::info!("interval: processing thread running");
        let mut report = vec![0u8; REPORT_LEN];

        let (forced, owed) = loop {
            let next = {
                let mut state = self.state.lock();
                let next = loop {
                    if state.epoch != epoch {
                        // Stopped and restarted before this thread noticed
                        log::debug!("interval: superseded processing thread exiting");
                        return;
                    }
                    if state.thread == RunState::Stopped {
                        break Err(true);
                    }
                    if let Some(entry) = state.queue.dequeue(&mut report) {
                        break Ok(entry);
                    }
                    if state.thread == RunState::Finishing {
                        state.thread = RunState::Stopped;
                        break Err(false);
                    }
                    self.data_ready.wait(&mut state);
                };
                next.map_err(|forced| {
                    let owed = state.detector.settle();
                    if owed {
                        state.detector.owe_finish(forced);
                    }
                    state.configuration.settle();
                    (forced, owed)
                })
            };
            match next {
                Ok((timestamp, len)) => self.dispatch(timestamp, &report[..len]),
                Err(exit) => break exit,
            }
        };

        if owed {
            self.deliver_finish(component::DETECTOR);
        }
        log::info!("interval: processing thread stopped (forced: {})", forced);
    }

    fn dispatch(&self, timestamp: i64, report: &[u8]) {
        let Some(&id) = report.first() else {
            return;
        };
        match id {
            DATA_REPORT => self.process_counts(timestamp, report),
            id if protocol::is_configuration_response(id) => {
                let mut state = self.state.lock();
                if state.query.complete(id, &report[1..]) {
                    self.query_done.notify_all();
                } else {
                    log::debug!("interval: dropping unsolicited response 0x{:02X}", id);
                }
            }
            other => log::trace!("interval: ignoring report 0x{:02X}", other),
        }
    }

    fn process_counts(&self, timestamp: i64, report: &[u8]) {
        let Some(counts) = IntervalCounts::decode(report) else {
            return;
        };
        let attribution = self.state.lock().detector.attribute(timestamp, 0);
        match attribution {
            Attribution::Counted => {
                let listener = self.listeners.lock().get(component::DETECTOR);
                if let Some(l) = listener {
                    for channel in counts.channels() {
                        l.on_counts(timestamp, channel, 1);
                    }
                }
            }
            Attribution::Finished => self.deliver_finish(component::DETECTOR),
            Attribution::Ignored => {}
        }
    }

    fn get_configuration(
        self: &Arc<Self>,
        id: u8,
        setting: u8,
        out: &mut [u8],
    ) -> Result<usize> {
        check_component(id)?;
        let request = protocol::encode_get_request(setting, out.len());
        self.state.lock().query.open(setting)?;
        log::debug!("interval: query setting 0x{:02X}", setting);

        if let Err(e) = self.start(component::CONFIGURATION) {
            self.state.lock().query.close();
            return Err(e);
        }

        let result = match self.interface.send_configuration_request(&request) {
            Err(e) => {
                self.state.lock().query.close();
                Err(e)
            }
            Ok(()) => {
                let deadline = Instant::now() + self.config.query_timeout();
                let mut state = self.state.lock();
                while state.query.is_waiting() {
                    if self
                        .query_done
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                match state.query.close() {
                    QueryState::Success => {
                        let payload = state.query.result();
                        let n = payload.len().min(out.len());
                        out[..n].copy_from_slice(&payload[..n]);
                        Ok(n)
                    }
                    QueryState::Waiting => {
                        log::warn!("interval: query for setting 0x{:02X} timed out", setting);
                        Err(Error::QueryTimeout)
                    }
                    _ => Err(Error::QueryFailed),
                }
            }
        };

        if let Err(e) = self.stop(component::CONFIGURATION, true) {
            log::warn!("interval: failed to release configuration component: {}", e);
        }
        result
    }

    fn set_configuration(&self, id: u8, setting: u8, data: &[u8]) -> Result<()> {
        check_component(id)?;
        log::debug!(
            "interval: set setting 0x{:02X} ({} bytes)",
            setting,
            data.len()
        );
        self.interface
            .send_configuration(&protocol::encode_set_request(setting, data))
    }
}

fn check_component(id: u8) -> Result<()> {
    match id {
        component::DETECTOR | component::CONFIGURATION => Ok(()),
        _ => Err(Error::InvalidComponent(id)),
    }
}

fn check_detector(id: u8) -> Result<()> {
    if id == component::DETECTOR {
        Ok(())
    } else {
        Err(Error::InvalidComponent(id))
    }
}

impl DataProcessor for IntervalProcessor {
    fn endian(&self) -> Endian {
        Endian::Big
    }

    fn component_ids(&self) -> Vec<u8> {
        vec![component::DETECTOR]
    }

    fn add_component(&self, id: u8, listener: Weak<dyn ComponentListener>) -> Result<()> {
        check_detector(id)?;
        self.shared.listeners.lock().set(id, listener);
        Ok(())
    }

    fn remove_component(&self, id: u8) {
        if check_detector(id).is_err() {
            return;
        }
        self.shared.listeners.lock().remove(id);
        if let Err(e) = self.shared.stop(id, true) {
            log::warn!("interval: failed to stop removed component: {}", e);
        }
    }

    fn start_processing(&self, id: u8) -> Result<()> {
        check_component(id)?;
        self.shared.start(id)
    }

    fn stop_processing(&self, id: u8, force: bool) -> Result<()> {
        check_component(id)?;
        self.shared.stop(id, force)
    }

    fn queue_raw_data(&self, data: &[u8]) {
        self.shared.queue_data(data);
    }

    fn real_time(&self, id: u8) -> Result<i64> {
        check_component(id)?;
        let mut state = self.shared.state.lock();
        if id == component::DETECTOR && state.detector.status() == RunState::Running {
            let now = self.shared.clock.now_ticks();
            state.update_run_time(now);
        }
        state
            .component(id)
            .map(Component::real_time_ms)
            .ok_or(Error::InvalidComponent(id))
    }

    fn reset_real_time(&self, id: u8) -> Result<()> {
        check_component(id)?;
        let mut state = self.shared.state.lock();
        if id == component::DETECTOR {
            state.run_start = self.shared.clock.now_ticks();
        }
        state
            .component_mut(id)
            .map(Component::reset_real_time)
            .ok_or(Error::InvalidComponent(id))
    }

    fn get_configuration_data(&self, id: u8, setting: u8, out: &mut [u8]) -> Result<usize> {
        self.shared.get_configuration(id, setting, out)
    }

    fn set_configuration_data(&self, id: u8, setting: u8, data: &[u8]) -> Result<()> {
        self.shared.set_configuration(id, setting, data)
    }

    fn reset(&self) {
        let mut state = self.shared.state.lock();
        state.reassembler.reset();
        state.queue.clear();
    }
}
