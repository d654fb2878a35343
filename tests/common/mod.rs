pub(crate) mod consumer;

pub(crate) mod documents;

pub(crate) mod http;

pub(crate) mod identities;

pub(crate) mod logging;
