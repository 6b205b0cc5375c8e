//! Remote hardware provisioning ("install worker").
//!
//! Phase one validates the operator's parameters ([`validator`]) against a
//! provider/location selection ([`location`]). Phase two runs the remote
//! installation over a [`channel`] under the control of a
//! [`ProvisioningController`], streaming output into a [`Terminal`].

pub mod channel;
pub mod controller;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod location;
pub mod loopback;
pub mod session;
pub mod terminal;
pub mod validator;
pub mod ws;

pub use channel::{
    Channel, ChannelCommand, ChannelConnector, ChannelEvent, ChannelId, ChannelMessage, EventKind,
    InstallParams, SaveParams,
};
pub use controller::{accepts, DialogOutcome, DialogSnapshot, Dispatch, ProvisioningController};
pub use credentials::{CredentialProvider, StaticToken};
pub use driver::{run_dialog, DialogAction, DialogObserver};
pub use error::{ChannelError, ControllerError, ProtocolError, ResolverError, ValidationError};
pub use location::{ApiLocationResolver, LocationPicker, LocationResolver};
pub use loopback::LoopbackConnector;
pub use session::{Phase, ProvisioningSession, SessionError, SessionErrorKind};
pub use terminal::{MemorySink, StdoutSink, Terminal, TerminalSink};
pub use validator::{validate_install_form, RawInstallForm};
pub use ws::WsConnector;
