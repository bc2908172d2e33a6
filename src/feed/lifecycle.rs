//! I/O-free connection state machine.
//!
//! `Connecting → Open → Closed → Connecting → …` until [`ConnectionLifecycle::teardown`].
//! The async driver performs whatever the returned [`LifecycleAction`]s and
//! request lists ask for; this type only decides.

use crate::feed::protocol::OutboundRequest;
use crate::feed::types::PollPlan;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    Open,
    Closed,
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Connect,
    ScheduleReconnect(Duration),
    Nothing,
}

#[derive(Debug, Clone)]
pub struct ConnectionLifecycle {
    phase: ConnectionPhase,
    reconnect_delay: Duration,
    poll_plan: PollPlan,
    reconnect_pending: bool,
    connect_attempts: u64,
    next_corr: u64,
}

impl ConnectionLifecycle {
    pub fn new(reconnect_delay: Duration, poll_plan: PollPlan) -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            reconnect_delay,
            poll_plan,
            reconnect_pending: false,
            connect_attempts: 0,
            next_corr: 0,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn is_open(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }

    /// The safety-net poll timer exists exactly while the connection is open.
    pub fn poll_armed(&self) -> bool {
        self.is_open()
    }

    pub fn start(&mut self) -> LifecycleAction {
        if self.phase != ConnectionPhase::Idle {
            return LifecycleAction::Nothing;
        }
        self.enter_connecting()
    }

    fn enter_connecting(&mut self) -> LifecycleAction {
        self.phase = ConnectionPhase::Connecting;
        self.reconnect_pending = false;
        self.connect_attempts = self.connect_attempts.saturating_add(1);
        LifecycleAction::Connect
    }

    fn corr(&mut self) -> Option<u64> {
        self.next_corr = self.next_corr.wrapping_add(1);
        Some(self.next_corr)
    }

    /// Handshake requests for a freshly opened socket: auth, then the three
    /// snapshot pulls.
    pub fn on_open(&mut self, token: &str) -> Vec<OutboundRequest> {
        if self.phase != ConnectionPhase::Connecting {
            return Vec::new();
        }
        self.phase = ConnectionPhase::Open;

        vec![
            OutboundRequest::Auth {
                token: token.to_string(),
            },
            OutboundRequest::GetAllPnl { corr: self.corr() },
            OutboundRequest::GetOrderBookSnapshot { corr: self.corr() },
            OutboundRequest::GetTradeHistory { corr: self.corr() },
        ]
    }

    /// Covers both a dropped open socket and a failed connect attempt.
    pub fn on_closed(&mut self) -> LifecycleAction {
        match self.phase {
            ConnectionPhase::Connecting | ConnectionPhase::Open => {
                self.phase = ConnectionPhase::Closed;
            }
            ConnectionPhase::Closed => {}
            ConnectionPhase::Idle | ConnectionPhase::TornDown => return LifecycleAction::Nothing,
        }

        if self.reconnect_pending {
            return LifecycleAction::Nothing;
        }
        self.reconnect_pending = true;
        LifecycleAction::ScheduleReconnect(self.reconnect_delay)
    }

    pub fn on_reconnect_timer(&mut self) -> LifecycleAction {
        if self.phase != ConnectionPhase::Closed || !self.reconnect_pending {
            return LifecycleAction::Nothing;
        }
        self.enter_connecting()
    }

    pub fn on_poll_tick(&self) -> Vec<OutboundRequest> {
        if !self.poll_armed() {
            return Vec::new();
        }

        let mut requests = vec![OutboundRequest::GetAllPnl { corr: None }];
        if self.poll_plan.order_book {
            requests.push(OutboundRequest::GetOrderBookSnapshot { corr: None });
        }
        if self.poll_plan.trade_history {
            requests.push(OutboundRequest::GetTradeHistory { corr: None });
        }
        requests
    }

    /// Fills move PnL without a guaranteed PnL payload, so re-pull it.
    pub fn on_execution(&self) -> Option<OutboundRequest> {
        self.is_open()
            .then_some(OutboundRequest::GetAllPnl { corr: None })
    }

    pub fn teardown(&mut self) {
        self.phase = ConnectionPhase::TornDown;
        self.reconnect_pending = false;
    }
}
