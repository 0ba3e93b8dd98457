//! The connection state machine: one machine per role, coupled through
//! a small set of joint rules, plus the keep-alive latch and the
//! protocol-switch bookkeeping.
//!
//! Everything here is pure bookkeeping over enums; the transition
//! function has no access to buffers or events beyond their kind, which
//! keeps the successor state a deterministic function of
//! `(client, server, keep_alive, switch, event)`.

use error::LocalProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn peer(&self) -> Role {
        match *self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

/// Per-role connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Awaiting the start of a new message for this direction.
    Idle,
    /// Server only: the request is in, a response start-line must come
    /// next.
    SendResponse,
    /// Start-line done; body transfer in progress.
    SendBody,
    /// `EndOfMessage` has passed; waiting for the peer to finish.
    Done,
    /// No more cycles: this side must close once it is done.
    MustClose,
    /// This side has sent or received the shutdown signal.
    Closed,
    /// Client only: a switch proposal is out, the response will decide.
    MightSwitchProtocol,
    /// Handoff complete; further bytes are not HTTP.
    SwitchedProtocol,
    /// Terminal failure.
    Error,
}

/// The kind of protocol switch a request proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    Upgrade,
    Connect,
}

/// Event kinds, for transition lookups and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Request,
    InformationalResponse,
    Response,
    Data,
    EndOfMessage,
    ConnectionClosed,
}

/// The per-event transition table for one role's machine.
///
/// `None` means the event is illegal in that state. `switch` is only
/// ever `Some` for server responses that accept a pending proposal.
fn transition(role: Role, state: State, kind: EventKind,
    switch: Option<Switch>)
    -> Option<State>
{
    use self::EventKind::*;
    use self::Role::*;
    use self::State::*;
    match (role, state, kind) {
        (Client, Idle, Request) => Some(SendBody),
        (Client, Idle, ConnectionClosed) => Some(Closed),
        (Client, SendBody, Data) => Some(SendBody),
        (Client, SendBody, EndOfMessage) => Some(Done),

        // A server may respond without waiting for a complete request:
        // that is how error responses to garbage input get out.
        (Server, Idle, Response) if switch.is_none() => Some(SendBody),
        (Server, Idle, ConnectionClosed) => Some(Closed),
        (Server, SendResponse, InformationalResponse) => {
            match switch {
                Some(Switch::Upgrade) => Some(SwitchedProtocol),
                None => Some(SendResponse),
                Some(Switch::Connect) => None,
            }
        }
        (Server, SendResponse, Response) => {
            match switch {
                Some(Switch::Connect) => Some(SwitchedProtocol),
                None => Some(SendBody),
                Some(Switch::Upgrade) => None,
            }
        }
        (Server, SendBody, Data) => Some(SendBody),
        (Server, SendBody, EndOfMessage) => Some(Done),

        (_, Done, ConnectionClosed) => Some(Closed),
        (_, MustClose, ConnectionClosed) => Some(Closed),
        (_, Closed, ConnectionClosed) => Some(Closed),

        _ => None,
    }
}

/// The coupled pair of role machines plus sub-states.
#[derive(Debug)]
pub struct ConnectionState {
    client: State,
    server: State,
    keep_alive: bool,
    upgrade_proposed: bool,
    connect_proposed: bool,
}

impl ConnectionState {
    pub fn new() -> ConnectionState {
        ConnectionState {
            client: State::Idle,
            server: State::Idle,
            keep_alive: true,
            upgrade_proposed: false,
            connect_proposed: false,
        }
    }

    pub fn state(&self, role: Role) -> State {
        match role {
            Role::Client => self.client,
            Role::Server => self.server,
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn proposed(&self, switch: Switch) -> bool {
        match switch {
            Switch::Upgrade => self.upgrade_proposed,
            Switch::Connect => self.connect_proposed,
        }
    }

    pub fn has_pending_switch(&self) -> bool {
        self.upgrade_proposed || self.connect_proposed
    }

    /// The keep-alive latch: once disabled, never re-enabled.
    pub fn process_keep_alive_disabled(&mut self) {
        self.keep_alive = false;
        self.fire();
    }

    pub fn process_client_switch_proposal(&mut self, switch: Switch) {
        match switch {
            Switch::Upgrade => self.upgrade_proposed = true,
            Switch::Connect => self.connect_proposed = true,
        }
        self.fire();
    }

    pub fn process_error(&mut self, role: Role) {
        self.set_state(role, State::Error);
        self.fire();
    }

    /// Run one event through the machine of `role`.
    ///
    /// `server_switch` must be set when a server response accepts a
    /// pending switch proposal; the caller derives it from the event
    /// and the pending proposals. On failure nothing is mutated.
    pub fn process_event(&mut self, role: Role, kind: EventKind,
        server_switch: Option<Switch>)
        -> Result<(), LocalProtocolError>
    {
        if let Some(switch) = server_switch {
            debug_assert_eq!(role, Role::Server);
            if !self.proposed(switch) {
                return Err(LocalProtocolError::SwitchWithoutProposal);
            }
        }
        let state = self.state(role);
        let next = match transition(role, state, kind, server_switch) {
            Some(next) => next,
            None => return Err(LocalProtocolError::IllegalTransition(
                role, state, kind)),
        };
        // A request also starts the server's turn.
        let server_next = if role == Role::Client
            && kind == EventKind::Request
        {
            match self.server {
                State::Idle => Some(State::SendResponse),
                state => return Err(LocalProtocolError::IllegalTransition(
                    Role::Server, state, kind)),
            }
        } else {
            None
        };
        // A plain response means any pending proposal was declined.
        if server_switch.is_none() && kind == EventKind::Response {
            self.upgrade_proposed = false;
            self.connect_proposed = false;
        }
        self.set_state(role, next);
        if let Some(next) = server_next {
            self.server = next;
        }
        self.fire();
        Ok(())
    }

    /// Reset for the next request/response cycle.
    ///
    /// Only legal when both sides are `Done`, keep-alive survived, and
    /// no switch is pending. Sub-states are preserved.
    pub fn start_next_cycle(&mut self) -> Result<(), LocalProtocolError> {
        if self.client != State::Done || self.server != State::Done {
            return Err(LocalProtocolError::NotReusable);
        }
        if !self.keep_alive || self.has_pending_switch() {
            return Err(LocalProtocolError::NotReusable);
        }
        self.client = State::Idle;
        self.server = State::Idle;
        Ok(())
    }

    fn set_state(&mut self, role: Role, state: State) {
        match role {
            Role::Client => self.client = state,
            Role::Server => self.server = state,
        }
    }

    /// Apply the joint rules until nothing changes any more.
    fn fire(&mut self) {
        use self::State::*;
        loop {
            let before = (self.client, self.server);
            // A client that finished a switch proposal waits for the
            // verdict instead of counting as plainly done.
            if self.has_pending_switch() {
                if self.client == Done {
                    self.client = MightSwitchProtocol;
                }
            } else if self.client == MightSwitchProtocol {
                self.client = Done;
            }
            if !self.keep_alive {
                if self.client == Done {
                    self.client = MustClose;
                }
                if self.server == Done {
                    self.server = MustClose;
                }
            }
            match (self.client, self.server) {
                (MightSwitchProtocol, SwitchedProtocol) => {
                    self.client = SwitchedProtocol;
                }
                (Closed, Done) | (Closed, Idle) | (Error, Done) => {
                    self.server = MustClose;
                }
                (Done, Closed) | (Idle, Closed) | (Done, Error) => {
                    self.client = MustClose;
                }
                _ => {}
            }
            if (self.client, self.server) == before {
                return;
            }
        }
    }
}
