use std::sync::Arc;

use log::Logger;

use crate::db::Db;
use crate::store::Store;
use crate::urls::Urls;

pub type VecStore<O> = dyn Store<Output = O, Raw = Vec<u8>> + Send + Sync;

/// Shorthand for the bounds route constructors put on the store output.
pub trait SafeStore: Clone + Send + Sync {}
impl<T: Clone + Send + Sync> SafeStore for T {}

/// Everything a handler needs, cloned into each filter.
#[derive(Clone)]
pub struct Environment<O: Clone + Send + Sync> {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,
    pub urls: Arc<Urls>,
    pub store: Arc<VecStore<O>>,
    pub config: Config,
}

impl<O: Clone + Send + Sync> Environment<O> {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        urls: Arc<Urls>,
        store: Arc<VecStore<O>>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            urls,
            store,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// The default page size for listings.
    pub(crate) page_size: u32,

    /// The default (and maximum) number of recipes on the popular list.
    pub(crate) popular_page_size: u32,
}

impl Config {
    pub fn new(page_size: u32, popular_page_size: u32) -> Self {
        Self {
            page_size,
            popular_page_size,
        }
    }
}
