//! Processor for multi-component D3 links
//!
//! The interface board answers spectrum requests with one 8205 byte record
//! covering the time since the previous request. The gamma and neutron
//! detectors share that stream; each is a component with its own run state
//! and listener.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use radsdk_core::acquisition::{Attribution, Component, RunState, Timeline};
use radsdk_core::framing::{ExplicitLength, Reassembler};
use radsdk_core::listener::{broadcast_error, ComponentListener, ListenerTable};
use radsdk_core::message_ring::MessageRing;
use radsdk_core::query::{ConfigQuery, QueryState};
use radsdk_core::worker::Worker;
use radsdk_core::{
    Clock, DataInterface, DataProcessor, DataSink, Endian, Error, ErrorCode, ProcessorConfig,
    Result,
};

use crate::protocol::{self, component, report, Header, InternalErrorReport, SpectrumReport};

/// Components that receive spectrum data
const DATA_COMPONENTS: [u8; 2] = [component::GAMMA, component::NEUTRON];

struct State {
    reassembler: Reassembler<ExplicitLength>,
    messages: MessageRing,
    thread: RunState,
    /// Bumped for every processing thread spawned
    epoch: u64,
    gamma: Component,
    neutron: Component,
    configuration: Component,
    timeline: Timeline,
    query: ConfigQuery,
}

impl State {
    fn component_mut(&mut self, id: u8) -> Option<&mut Component> {
        match id {
            component::GAMMA => Some(&mut self.gamma),
            component::NEUTRON => Some(&mut self.neutron),
            component::CONFIGURATION => Some(&mut self.configuration),
            _ => None,
        }
    }

    fn component(&self, id: u8) -> Option<&Component> {
        match id {
            component::GAMMA => Some(&self.gamma),
            component::NEUTRON => Some(&self.neutron),
            component::CONFIGURATION => Some(&self.configuration),
            _ => None,
        }
    }

    fn any_running(&self) -> bool {
        [&self.gamma, &self.neutron, &self.configuration]
            .iter()
            .any(|c| c.status() == RunState::Running)
    }

    fn acquiring(&self) -> bool {
        self.gamma.is_active() || self.neutron.is_active()
    }

    fn draining(&self) -> bool {
        self.gamma.status() == RunState::Finishing || self.neutron.status() == RunState::Finishing
    }

    /// Stop every data component still active, returning the ones now owed
    /// a finished callback
    fn settle(&mut self, forced: bool) -> [Option<u8>; 2] {
        self.configuration.settle();
        DATA_COMPONENTS.map(|id| {
            let c = self.component_mut(id)?;
            if !c.settle() {
                return None;
            }
            c.owe_finish(forced);
            Some(id)
        })
    }
}

struct Shared {
    interface: Arc<dyn DataInterface>,
    clock: Arc<dyn Clock>,
    config: ProcessorConfig,
    /// Data lock
    state: Mutex<State>,
    data_ready: Condvar,
    query_done: Condvar,
    finish_done: Condvar,
    /// Event lock
    listeners: Mutex<ListenerTable>,
    worker: Worker,
}

/// D3 stream processor
///
/// Registers itself as the transport's data sink on creation and
/// unregisters when dropped.
pub struct D3Processor {
    shared: Arc<Shared>,
}

impl D3Processor {
    pub fn new(
        interface: Arc<dyn DataInterface>,
        clock: Arc<dyn Clock>,
        config: ProcessorConfig,
    ) -> Self {
        let buffer_len = protocol::MAX_REPORT_LEN * config.message_buffer_reports.max(1);
        let state = State {
            reassembler: Reassembler::new(ExplicitLength::new(protocol::MAX_REPORT_LEN)),
            messages: MessageRing::new(buffer_len),
            thread: RunState::Stopped,
            epoch: 0,
            gamma: Component::new(),
            neutron: Component::new(),
            configuration: Component::new(),
            timeline: Timeline::new(),
            query: ConfigQuery::new(protocol::MAX_REPORT_LEN),
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

    /// Status of the processing thread
    pub fn thread_state(&self) -> RunState {
        self.shared.state.lock().thread
    }

    /// Status of one component
    pub fn component_state(&self, id: u8) -> Option<RunState> {
        self.shared.state.lock().component(id).map(Component::status)
    }

    /// Bytes of complete messages waiting to be processed
    pub fn queued_bytes(&self) -> usize {
        self.shared.state.lock().messages.len()
    }
}

impl Drop for D3Processor {
    fn drop(&mut self) {
        self.shared.interface.set_sink(None);
        let was_running = {
            let mut state = self.shared.state.lock();
            for id in [component::GAMMA, component::NEUTRON, component::CONFIGURATION] {
                if let Some(c) = state.component_mut(id) {
                    c.settle();
                }
            }
            let was_running = state.thread.is_active();
            state.thread = RunState::Stopped;
            was_running
        };
        if was_running {
            if let Err(e) = self.shared.interface.stop_reading() {
                log::warn!("d3: failed to stop transport: {}", e);
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
        let report = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let messages = &mut state.messages;
            let report = state
                .reassembler
                .push(chunk, &mut |head: &[u8], tail: &[u8]| {
                    messages.push_parts(head, tail)
                });
            if report.delivered > 0 {
                self.data_ready.notify_one();
            }
            report
        };

        for _ in 0..report.dropped {
            log::warn!("d3: message buffer full, report dropped");
            self.raise_error(ErrorCode::BufferFull, "Message buffer full. Packet ignored");
        }
        if let Some(len) = report.corrupt {
            log::warn!("d3: corrupt length field {}, chunk abandoned", len);
            self.raise_error(
                ErrorCode::InternalDevice,
                &format!("Corrupt input data detected (length {})", len),
            );
        }
    }

    /// Report a fault to every active component
    fn raise_error(&self, code: ErrorCode, message: &str) {
        let active: Vec<u8> = {
            let state = self.state.lock();
            DATA_COMPONENTS
                .into_iter()
                .filter(|&id| state.component(id).is_some_and(Component::is_active))
                .collect()
        };
        let listeners = self.listeners.lock().snapshot(active);
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
            let previous = state.thread;
            state.thread = RunState::Running;
            if previous == RunState::Stopped {
                state.reassembler.reset();
                state.messages.clear();
                state.timeline.restart();
                state.epoch = state.epoch.wrapping_add(1);
            }
            (
                previous == RunState::Stopped,
                previous == RunState::Finishing,
                state.epoch,
            )
        };
        log::debug!("d3: start processing component 0x{:02X}", id);

        if spawn || resume {
            if let Err(e) = self.interface.begin_reading() {
                log::error!("d3: failed to start transport: {}", e);
                self.abort_start(id);
                return Err(e);
            }
        }
        if spawn {
            let shared = Arc::clone(self);
            if let Err(e) = self.worker.spawn("d3-processor", move || shared.run(epoch)) {
                self.abort_start(id);
                if let Err(e) = self.interface.stop_reading() {
                    log::warn!("d3: failed to stop transport: {}", e);
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
        if !state.any_running() {
            state.thread = RunState::Stopped;
        }
    }

    fn stop(&self, id: u8, force: bool) -> Result<()> {
        let (stop_thread, handle) = {
            let mut state = self.state.lock();
            let now = self.clock.now_ticks();
            let c = state.component_mut(id).ok_or(Error::InvalidComponent(id))?;
            if !c.end(force, now) {
                return Ok(());
            }
            if force {
                c.owe_finish(true);
            }
            let stop_thread = state.thread.is_active()
                && !state.any_running()
                && !state.query.is_waiting();
            let mut join = false;
            if stop_thread {
                // Another component still draining keeps the thread finishing
                join = force && !state.draining();
                state.thread = if join {
                    RunState::Stopped
                } else {
                    RunState::Finishing
                };
            }
            (stop_thread, join.then(|| self.worker.take()).flatten())
        };
        log::debug!(
            "d3: stop processing component 0x{:02X} (force: {})",
            id,
            force
        );

        if stop_thread {
            if let Err(e) = self.interface.stop_reading() {
                log::warn!("d3: failed to stop transport: {}", e);
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
        log::info!("d3: processing thread running");
        let mut message = vec![0u8; protocol::MAX_REPORT_LEN];
        let poll_ms = self.config.spectrum_poll_ms as i64;
        let mut next_poll = self.clock.now_ms();

        let (forced, owed) = loop {
            let next = {
                let mut state = self.state.lock();
                if state.epoch != epoch {
                    // Stopped and restarted before this thread noticed
                    log::debug!("d3: superseded processing thread exiting");
                    return;
                }
                if state.thread == RunState::Stopped {
                    break (true, state.settle(true));
                }
                match state.messages.pop(&mut message) {
                    Some(len) => Some(len),
                    None if state.thread == RunState::Finishing => {
                        state.thread = RunState::Stopped;
                        break (false, state.settle(false));
                    }
                    None => {
                        if !state.messages.is_empty() {
                            log::warn!("d3: unreadable message buffer, clearing");
                            state.messages.clear();
                        }
                        let wait = (next_poll - self.clock.now_ms()).max(1) as u64;
                        self.data_ready
                            .wait_for(&mut state, Duration::from_millis(wait));
                        None
                    }
                }
            };
            if let Some(len) = next {
                self.dispatch(&message[..len]);
            }

            if self.clock.now_ms() >= next_poll {
                let acquiring = self.state.lock().acquiring();
                if acquiring {
                    self.request_spectrum();
                }
                next_poll = self.clock.now_ms() + poll_ms;
            }
        };

        for id in owed.into_iter().flatten() {
            self.deliver_finish(id);
        }
        log::info!("d3: processing thread stopped (forced: {})", forced);
    }

    fn request_spectrum(&self) {
        let request =
            protocol::encode_get_request(component::INTERFACE_BOARD, report::GET_16BIT_SPECTRUM);
        if let Err(e) = self.interface.send_configuration(&request) {
            log::warn!("d3: spectrum request failed: {}", e);
        }
    }

    fn dispatch(&self, message: &[u8]) {
        let header = match Header::decode(message) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("d3: {}", e);
                return;
            }
        };
        log::trace!(
            "d3: report 0x{:02X} from component 0x{:02X} ({} bytes)",
            header.report,
            header.component,
            header.size
        );

        match header.report {
            report::START => {}
            report::GET_16BIT_SPECTRUM => self.process_spectrum(message),
            report::INTERNAL_ERROR => match InternalErrorReport::decode(message) {
                Ok(e) => self.raise_error(
                    ErrorCode::InternalDevice,
                    &format!("Device error {}: {}", e.error_id, e.text),
                ),
                Err(e) => self.raise_error(ErrorCode::InternalDevice, &e.to_string()),
            },
            id if protocol::is_configuration_response(id) => {
                self.process_configuration(header, message)
            }
            other => log::trace!("d3: ignoring report 0x{:02X}", other),
        }
    }

    fn process_spectrum(&self, message: &[u8]) {
        let spectrum = match SpectrumReport::decode(message) {
            Ok(s) => s,
            Err(e) => {
                self.raise_error(ErrorCode::InternalDevice, &e.to_string());
                return;
            }
        };
        let elapsed = spectrum.elapsed_ms as i64;
        let now = self.clock.now_ticks();

        let (timestamp, gamma, neutron) = {
            let mut state = self.state.lock();
            let Some(timestamp) = state.timeline.advance(spectrum.elapsed_ms, now) else {
                log::debug!("d3: first spectrum after start opens the time reference");
                return;
            };
            let gamma = state.gamma.attribute(timestamp, elapsed);
            let neutron = state.neutron.attribute(timestamp, elapsed);
            (timestamp, gamma, neutron)
        };

        let (gamma_listener, neutron_listener) = {
            let listeners = self.listeners.lock();
            (
                listeners.get(component::GAMMA),
                listeners.get(component::NEUTRON),
            )
        };

        if let (Attribution::Counted, Some(l)) = (gamma, &gamma_listener) {
            for (channel, count) in spectrum.channels() {
                if count > 0 {
                    l.on_counts(timestamp, channel, count as u32);
                }
            }
        }
        if gamma == Attribution::Finished {
            self.deliver_finish(component::GAMMA);
        }
        if let (Attribution::Counted, Some(l)) = (neutron, &neutron_listener) {
            if spectrum.neutron_counts > 0 {
                l.on_counts(timestamp, 0, spectrum.neutron_counts as u32);
            }
        }
        if neutron == Attribution::Finished {
            self.deliver_finish(component::NEUTRON);
        }
    }

    fn process_configuration(&self, header: Header, message: &[u8]) {
        let payload = match protocol::payload(message) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("d3: bad configuration response: {}", e);
                let mut state = self.state.lock();
                if state.query.fail() {
                    self.query_done.notify_all();
                }
                return;
            }
        };
        let mut state = self.state.lock();
        if state.query.complete(header.report, payload) {
            self.query_done.notify_all();
        } else {
            log::debug!(
                "d3: dropping unsolicited configuration response 0x{:02X}",
                header.report
            );
        }
    }

    fn get_configuration(
        self: &Arc<Self>,
        id: u8,
        setting: u8,
        out: &mut [u8],
    ) -> Result<usize> {
        check_addressable(id)?;
        let request = protocol::encode_get_request(id, setting);
        self.state.lock().query.open(setting)?;
        log::debug!(
            "d3: query setting 0x{:02X} on component 0x{:02X}",
            setting,
            id
        );

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
                        if payload.len() > out.len() {
                            Err(Error::BufferTooSmall {
                                needed: payload.len(),
                                available: out.len(),
                            })
                        } else {
                            out[..payload.len()].copy_from_slice(payload);
                            Ok(payload.len())
                        }
                    }
                    QueryState::Waiting => {
                        log::warn!("d3: query for setting 0x{:02X} timed out", setting);
                        Err(Error::QueryTimeout)
                    }
                    _ => Err(Error::QueryFailed),
                }
            }
        };

        if let Err(e) = self.stop(component::CONFIGURATION, true) {
            log::warn!("d3: failed to release configuration component: {}", e);
        }
        result
    }

    fn set_configuration(&self, id: u8, setting: u8, data: &[u8]) -> Result<()> {
        check_addressable(id)?;
        let request = protocol::encode_set_request(id, setting, data)
            .map_err(|e| Error::Unsupported(e.to_string()))?;
        log::debug!(
            "d3: set setting 0x{:02X} on component 0x{:02X} ({} bytes)",
            setting,
            id,
            data.len()
        );
        self.interface.send_configuration(&request)
    }
}

/// Components a configuration request may address
fn check_addressable(id: u8) -> Result<()> {
    match id {
        component::GAMMA | component::NEUTRON | component::INTERFACE_BOARD => Ok(()),
        _ => Err(Error::InvalidComponent(id)),
    }
}

fn check_data_component(id: u8) -> Result<()> {
    if DATA_COMPONENTS.contains(&id) {
        Ok(())
    } else {
        Err(Error::InvalidComponent(id))
    }
}

impl DataProcessor for D3Processor {
    fn endian(&self) -> Endian {
        Endian::Little
    }

    fn component_ids(&self) -> Vec<u8> {
        DATA_COMPONENTS.to_vec()
    }

    fn add_component(&self, id: u8, listener: Weak<dyn ComponentListener>) -> Result<()> {
        check_data_component(id)?;
        self.shared.listeners.lock().set(id, listener);
        Ok(())
    }

    fn remove_component(&self, id: u8) {
        if check_data_component(id).is_err() {
            return;
        }
        self.shared.listeners.lock().remove(id);
        if let Err(e) = self.shared.stop(id, true) {
            log::warn!("d3: failed to stop removed component: {}", e);
        }
    }

    fn start_processing(&self, id: u8) -> Result<()> {
        self.shared.start(id)
    }

    fn stop_processing(&self, id: u8, force: bool) -> Result<()> {
        self.shared.stop(id, force)
    }

    fn queue_raw_data(&self, data: &[u8]) {
        self.shared.queue_data(data);
    }

    fn real_time(&self, id: u8) -> Result<i64> {
        check_data_component(id)?;
        let state = self.shared.state.lock();
        state
            .component(id)
            .map(Component::real_time_ms)
            .ok_or(Error::InvalidComponent(id))
    }

    fn reset_real_time(&self, id: u8) -> Result<()> {
        check_data_component(id)?;
        let mut state = self.shared.state.lock();
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
        state.messages.clear();
    }
}
