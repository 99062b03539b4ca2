//! Harvester and OAI-PMH verb dispatcher for a mirrored article repository.
//!
//! The binary (`src/main.rs`) only drives the harvester side (the `sync`
//! subcommand). The provider side — [`oai_server::OaiServer`], the
//! [`dc`] writer, and [`token::ResumptionToken`] — has no HTTP server of
//! its own; per the spec, the HTTP layer that turns verb requests into
//! calls against `OaiServer` and wraps its results in the OAI-PMH XML
//! envelope is an external collaborator. Exposing these as a library lets
//! that collaborator depend on this crate directly.

pub mod connector;
pub mod dc;
pub mod extract;
pub mod harvester;
pub mod oai_server;
pub mod record;
pub mod retry;
pub mod settings;
pub mod store;
pub mod tasks;
pub mod token;
