//! Background search worker and the bot controller that drives it.
//!
//! [`SearchWorker`] owns one named thread that answers [`Message`]s in order.
//! At most one search is outstanding at a time; pings may be sent whenever.
//! Every request carries a [`Ticket`] and a reply is only handed to the caller
//! if its ticket is still expected, so answers to abandoned requests are
//! dropped instead of being mistaken for fresh ones.
//!
//! [`BotController`] is the game-facing side: it keeps the enabled flag and
//! the search budget, spawns the worker lazily and tears it down when the bot
//! is switched off or the game ends.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;

use crate::codec::GridSnapshot;
use crate::engine;
use crate::expectimax::{heuristic, SearchConfig};
use crate::protocol::{self, Message, Response, SearchRequest};

const THREAD_NAME: &str = "bot-2048-search";

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("a search request is already outstanding")]
    Busy,
    #[error("search worker is no longer running")]
    Disconnected,
    #[error("failed to spawn search worker: {0}")]
    Spawn(#[from] io::Error),
}

/// Correlates a reply with the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

struct Envelope<T> {
    ticket: Ticket,
    body: T,
}

pub struct SearchWorker {
    requests: Sender<Envelope<Message>>,
    responses: Receiver<Envelope<Response>>,
    next_ticket: u64,
    in_flight: Option<Ticket>,
    pending_ping: Option<Ticket>,
    _handle: JoinHandle<()>,
}

impl SearchWorker {
    pub fn spawn() -> Result<Self, WorkerError> {
        let (req_tx, req_rx) = mpsc::channel();
        let (resp_tx, resp_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(req_rx, resp_tx))?;
        debug!("spawned {}", THREAD_NAME);
        Ok(Self {
            requests: req_tx,
            responses: resp_rx,
            next_ticket: 0,
            in_flight: None,
            pending_ping: None,
            _handle: handle,
        })
    }

    /// True while a search request has not been answered.
    #[inline]
    pub fn is_busy(&self) -> bool { self.in_flight.is_some() }

    pub fn submit(&mut self, request: SearchRequest) -> Result<Ticket, WorkerError> {
        if self.is_busy() {
            return Err(WorkerError::Busy);
        }
        let ticket = self.send(Message::Search(request))?;
        self.in_flight = Some(ticket);
        Ok(ticket)
    }

    /// Ask whether the worker is alive. While an earlier ping is unanswered
    /// its ticket is returned again instead of queueing another.
    pub fn ping(&mut self) -> Result<Ticket, WorkerError> {
        if let Some(ticket) = self.pending_ping {
            return Ok(ticket);
        }
        let ticket = self.send(Message::Ping)?;
        self.pending_ping = Some(ticket);
        Ok(ticket)
    }

    /// Stop waiting for the outstanding search. Its reply is dropped when it
    /// arrives and a new search may be submitted right away.
    pub fn abandon(&mut self) -> Option<Ticket> {
        let ticket = self.in_flight.take();
        if let Some(ticket) = ticket {
            debug!("abandoning search {:?}", ticket);
        }
        ticket
    }

    /// Next expected reply, if one is already waiting.
    pub fn try_recv(&mut self) -> Result<Option<(Ticket, Response)>, WorkerError> {
        loop {
            match self.responses.try_recv() {
                Ok(envelope) => {
                    if let Some(reply) = self.accept(envelope) {
                        return Ok(Some(reply));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(self.disconnected()),
            }
        }
    }

    /// Wait up to `timeout` for the next expected reply.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(Ticket, Response)>, WorkerError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(envelope) => {
                    if let Some(reply) = self.accept(envelope) {
                        return Ok(Some(reply));
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(self.disconnected()),
            }
        }
    }

    /// Stop the worker. A search in progress finishes on its own thread and
    /// its answer is discarded.
    pub fn terminate(self) {}

    fn send(&mut self, body: Message) -> Result<Ticket, WorkerError> {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        if self.requests.send(Envelope { ticket, body }).is_err() {
            return Err(self.disconnected());
        }
        Ok(ticket)
    }

    fn accept(&mut self, envelope: Envelope<Response>) -> Option<(Ticket, Response)> {
        let Envelope { ticket, body } = envelope;
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
            return Some((ticket, body));
        }
        if self.pending_ping == Some(ticket) {
            self.pending_ping = None;
            return Some((ticket, body));
        }
        debug!("dropping stale reply {:?}", ticket);
        None
    }

    fn disconnected(&mut self) -> WorkerError {
        warn!("{} is gone", THREAD_NAME);
        self.in_flight = None;
        self.pending_ping = None;
        WorkerError::Disconnected
    }
}

impl Drop for SearchWorker {
    fn drop(&mut self) {
        debug!("terminating {}", THREAD_NAME);
    }
}

fn run(requests: Receiver<Envelope<Message>>, responses: Sender<Envelope<Response>>) {
    engine::new();
    heuristic::warm();
    info!("{} ready", THREAD_NAME);
    for Envelope { ticket, body } in requests.iter() {
        let reply = protocol::handle(body);
        if responses.send(Envelope { ticket, body: reply }).is_err() {
            debug!("caller went away, dropping reply {:?}", ticket);
            break;
        }
    }
    debug!("{} exiting", THREAD_NAME);
}

/// Game-facing automation switch.
pub struct BotController {
    enabled: bool,
    max_depth: u32,
    time_limit_ms: u64,
    worker: Option<SearchWorker>,
}

impl BotController {
    pub fn new(cfg: &SearchConfig) -> Self {
        Self { enabled: false, max_depth: cfg.max_depth, time_limit_ms: cfg.time_limit_ms, worker: None }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool { self.enabled }

    /// True while a move request is outstanding.
    #[inline]
    pub fn is_calculating(&self) -> bool { self.worker.as_ref().map_or(false, SearchWorker::is_busy) }

    pub fn set_budget(&mut self, max_depth: u32, time_limit_ms: u64) {
        self.max_depth = max_depth;
        self.time_limit_ms = time_limit_ms;
    }

    pub fn enable(&mut self) {
        if !self.enabled {
            info!("bot enabled (depth {}, {} ms)", self.max_depth, self.time_limit_ms);
        }
        self.enabled = true;
    }

    /// Switch off and drop the worker together with any pending request.
    pub fn disable(&mut self) {
        if self.enabled {
            info!("bot disabled");
        }
        self.enabled = false;
        if let Some(worker) = self.worker.take() {
            worker.terminate();
        }
    }

    pub fn game_over(&mut self) {
        info!("game over, stopping bot");
        self.disable();
    }

    /// Ask for a move on `grid`. Returns `false` without doing anything when
    /// the bot is off or a request is already outstanding.
    pub fn request_move(&mut self, grid: &GridSnapshot) -> Result<bool, WorkerError> {
        if !self.enabled || self.is_calculating() {
            return Ok(false);
        }
        if self.worker.is_none() {
            self.worker = Some(SearchWorker::spawn()?);
        }
        let request = SearchRequest::new(grid.clone(), self.max_depth, self.time_limit_ms);
        let submitted = match self.worker.as_mut() {
            Some(worker) => worker.submit(request).map(|_| true),
            None => Err(WorkerError::Disconnected),
        };
        if let Err(WorkerError::Disconnected) = submitted {
            self.disable();
        }
        submitted
    }

    /// Wait up to `timeout` for the answer to the outstanding request.
    ///
    /// Nothing is returned while the bot is off. A dead worker switches the
    /// bot off.
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<Response>, WorkerError> {
        if !self.enabled {
            return Ok(None);
        }
        let Some(worker) = self.worker.as_mut() else {
            return Ok(None);
        };
        match worker.recv_timeout(timeout) {
            Ok(reply) => Ok(reply.map(|(_, response)| response)),
            Err(e) => {
                self.disable();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::engine::Board;

    const WAIT: Duration = Duration::from_secs(30);

    fn grid(raw: u64) -> GridSnapshot { codec::decode(Board::from_raw(raw), 4).unwrap() }

    #[test]
    fn ping_answers_ready() {
        let mut worker = SearchWorker::spawn().unwrap();
        let ticket = worker.ping().unwrap();
        let (got, reply) = worker.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(got, ticket);
        assert_eq!(reply, Response::ready());
        assert!(!worker.is_busy());
    }

    #[test]
    fn second_search_is_refused_while_busy() {
        let mut worker = SearchWorker::spawn().unwrap();
        let request = SearchRequest::new(grid(0x1000_0000_0000_0001), 2, 1000);
        let first = worker.submit(request.clone()).unwrap();
        assert!(worker.is_busy());
        assert!(matches!(worker.submit(request), Err(WorkerError::Busy)));
        let (got, reply) = worker.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(got, first);
        assert!(reply.chosen_direction().is_some());
        assert!(!worker.is_busy());
    }

    #[test]
    fn stale_replies_are_dropped() {
        let mut worker = SearchWorker::spawn().unwrap();
        let first = worker.submit(SearchRequest::new(grid(0x1000_0000_0000_0001), 1, 1000)).unwrap();
        assert_eq!(worker.abandon(), Some(first));
        assert!(!worker.is_busy());
        assert_eq!(worker.abandon(), None);
        let ping = worker.ping().unwrap();
        let (got, reply) = worker.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(got, ping);
        assert_eq!(reply, Response::ready());
        assert!(worker.try_recv().unwrap().is_none());
    }

    #[test]
    fn repeated_pings_share_one_ticket() {
        let mut worker = SearchWorker::spawn().unwrap();
        let ticket = worker.ping().unwrap();
        for _ in 0..100 {
            assert_eq!(worker.ping().unwrap(), ticket);
        }
        let (got, reply) = worker.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(got, ticket);
        assert_eq!(reply, Response::ready());
        assert!(worker.recv_timeout(Duration::from_millis(100)).unwrap().is_none());
        assert_ne!(worker.ping().unwrap(), ticket);
    }

    #[test]
    fn abandoned_search_frees_the_slot() {
        let mut worker = SearchWorker::spawn().unwrap();
        let request = SearchRequest::new(grid(0x1000_0000_0000_0001), 2, 1000);
        let stale = worker.submit(request.clone()).unwrap();
        worker.abandon();
        let fresh = worker.submit(request).unwrap();
        assert_ne!(stale, fresh);
        let (got, reply) = worker.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(got, fresh);
        assert!(reply.chosen_direction().is_some());
    }

    #[test]
    fn disabled_controller_does_nothing() {
        let mut bot = BotController::new(&SearchConfig::default());
        assert!(!bot.request_move(&grid(0x1000_0000_0000_0001)).unwrap());
        assert!(bot.poll(Duration::from_millis(1)).unwrap().is_none());
        assert!(bot.worker.is_none());
    }

    #[test]
    fn controller_round_trip_and_teardown() {
        let mut bot = BotController::new(&SearchConfig { max_depth: 2, ..Default::default() });
        bot.enable();
        assert!(bot.request_move(&grid(0x1000_0000_0000_0001)).unwrap());
        assert!(bot.is_calculating());
        // Only one outstanding request.
        assert!(!bot.request_move(&grid(0x1000_0000_0000_0001)).unwrap());
        let reply = loop {
            if let Some(reply) = bot.poll(Duration::from_millis(50)).unwrap() {
                break reply;
            }
        };
        assert!(reply.chosen_direction().is_some());
        assert!(!bot.is_calculating());

        assert!(bot.request_move(&grid(0x1000_0000_0000_0001)).unwrap());
        bot.game_over();
        assert!(!bot.is_enabled());
        assert!(!bot.is_calculating());
        assert!(bot.poll(Duration::from_millis(1)).unwrap().is_none());
    }
}
