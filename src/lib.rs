//! imbridge: one messaging and directory contract over enterprise IM platforms.
//!
//! Callers build a [`message::Message`] and hand it to any
//! [`client::ImClient`]; the provider adapters in [`providers`] take care of
//! access tokens, each platform's wire format, and normalizing directory
//! listings into [`directory::Department`] and [`directory::User`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod credentials;
pub mod directory;
pub mod logging;
pub mod message;
pub mod providers;
pub mod relay;
pub mod token;
pub mod transport;

pub use client::{ImClient, ImError, Provider};
pub use directory::{Department, User};
pub use message::{Message, MessageType};
