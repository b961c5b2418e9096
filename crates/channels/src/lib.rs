//! Chat transport collaborator interfaces.
//!
//! The command engine never talks to a chat platform directly. It consumes a
//! [`Transport`] for send/edit/delete, a [`PermissionSource`] for effective
//! permissions, and produces [`OutgoingMessage`] values for the transport to
//! render.

pub mod error;
pub mod message;
pub mod outbound;
pub mod permissions;

pub use {
    error::{Error, Result},
    message::{Attachment, Component, OutgoingMessage, RichContent, RichField},
    outbound::Transport,
    permissions::{Permission, PermissionSet, PermissionSource, StaticPermissions},
};
