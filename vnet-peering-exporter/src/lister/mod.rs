//! Peering listers
//!
//! A lister turns a [`PeeringTarget`] into a lazy, finite stream of pages.
//! Every item is one page of records or the error that ended the listing.
//! Streams are not restartable: a new cycle asks for a new stream.

pub mod azure;

use futures::stream::BoxStream;

use crate::error::ListError;
use crate::models::{PeeringRecord, PeeringTarget};

pub use azure::{ArmPeeringLister, ClientSecretCredential};

pub type PeeringPage = Vec<PeeringRecord>;

pub type PageStream<'a> = BoxStream<'a, Result<PeeringPage, ListError>>;

pub trait PeeringLister: Send + Sync {
    fn list_peerings<'a>(&'a self, target: &'a PeeringTarget) -> PageStream<'a>;
}
