/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Configuration as specified by the operator.
//!
//! [`Configuration`] parameterizes the [management service](crate::management), and
//! [`DocumentProviderConfiguration`] parameterizes the
//! [`DocumentProvider`](crate::provider::document::DocumentProvider). Both are built with the builder
//! pattern, for example:
//!
//! ```ignore
//! let configuration = Configuration::builder()
//!     .refresh_interval(Duration::from_secs(60))
//!     .log_events(true)
//!     .build();
//!
//! let document_config = DocumentProviderConfiguration::builder()
//!     .location("https://management.example.org/vcs".to_string())
//!     .virtual_chain_id(VirtualChainID::new(42))
//!     .build();
//! ```

use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::types::data_types::VirtualChainID;

/// Default value of [`DocumentProviderConfiguration::max_document_size`]: 50 MiB.
pub const DEFAULT_MAX_DOCUMENT_SIZE: u64 = 50 << 20;

/// Default value of [`DocumentProviderConfiguration::http_timeout`].
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(45);

/// Stores the user-defined parameters of a [`ManagementService`](crate::management::ManagementService):
/// 1. The refresh interval. If it is zero, the service refreshes only once, on start, and afterwards
///    only when [`refresh`](crate::management::ManagementService::refresh) is called explicitly.
/// 2. The "Log Events" flag. If set to "true" then the default loggers in [`crate::logging`] are
///    registered.
///
/// ## Log Events
///
/// The service logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.refresh_interval(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the period between background refreshes. `Duration::ZERO` disables them. Required."))]
    pub refresh_interval: Duration,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl Configuration {
    /// Check whether the background refresher should be started.
    pub fn periodic_refresh_enabled(&self) -> bool {
        !self.refresh_interval.is_zero()
    }
}

/// Stores the parameters of a [`DocumentProvider`](crate::provider::document::DocumentProvider):
/// 1. The location of the document: a local path or an `http(s)` URL.
/// 2. The ID of the virtual chain whose entry in the document this node follows.
/// 3. The maximum size of the document in bytes.
/// 4. The timeout of an HTTP fetch. This belongs to the HTTP client; the provider itself never
///    enforces a deadline.
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [DocumentProviderConfiguration]. On the builder call the following methods to construct a valid [DocumentProviderConfiguration].

    Required:
    - `.location(...)`
    - `.virtual_chain_id(...)`

    Optional:
    - `.max_document_size(...)`
    - `.http_timeout(...)`
"))]
pub struct DocumentProviderConfiguration {
    #[builder(setter(doc = "Set the path or URL of the management document. Required."))]
    pub location: String,
    #[builder(setter(doc = "Set the ID of the virtual chain to follow. Required."))]
    pub virtual_chain_id: VirtualChainID,
    #[builder(default = DEFAULT_MAX_DOCUMENT_SIZE, setter(doc = "Set the maximum document size in bytes. Optional."))]
    pub max_document_size: u64,
    #[builder(default = Some(DEFAULT_HTTP_TIMEOUT), setter(doc = "Set the timeout of HTTP fetches, or `None` for no timeout. Optional."))]
    pub http_timeout: Option<Duration>,
}
