// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Protocol implementations of [`ProtocolRequest`](crate::traits::ProtocolRequest).

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub mod common;
pub mod http;
pub mod network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    Http,
    Network,
}

impl Display for ProtocolType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ProtocolType::Http => "http",
            ProtocolType::Network => "network",
        })
    }
}
