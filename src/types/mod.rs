/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The versioned-term data model.
//!
//! The types defined here are shared by the [providers](crate::provider), which build
//! [snapshots](snapshot::ManagementSnapshot), and the [management service](crate::management), which
//! publishes and queries them.

pub mod data_types;

pub mod terms;

pub mod topology;

pub mod snapshot;
