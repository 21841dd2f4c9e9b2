// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod configuration;

pub use configuration::{Configuration, ConfigurationError};
