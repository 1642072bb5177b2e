/*
   Copyright 2020 Ilya Grishkov

   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

use std::io;
use std::net::Ipv4Addr;
use thiserror::Error;

/// A probing result.
pub type Result<T> = std::result::Result<T, Error>;

/// A probing error.
#[derive(Error, Debug)]
pub enum Error {
    /// The raw ICMP channel could not be opened, usually for lack of privileges.
    #[error("unable to open ICMP channel (are you running as root?): {0}")]
    ChannelOpen(io::Error),
    #[error("unable to set TTL to {1}: {0}")]
    SetTtl(io::Error, u8),
    #[error("failed to send probe to {1}: {0}")]
    SendFailed(io::Error, Ipv4Addr),
    #[error("failed to receive reply: {0}")]
    RecvFailed(io::Error),
    #[error("invalid packet: {0}")]
    InvalidPacket(&'static str),
    #[error("invalid config: {0}")]
    BadConfig(String),
}

impl Error {
    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ChannelOpen(_) => ErrorKind::ChannelOpen,
            Self::SetTtl(_, _) => ErrorKind::SetTtl,
            Self::SendFailed(_, _) => ErrorKind::SendFailed,
            Self::RecvFailed(_) => ErrorKind::RecvFailed,
            Self::InvalidPacket(_) => ErrorKind::InvalidPacket,
            Self::BadConfig(_) => ErrorKind::BadConfig,
        }
    }

    /// Returns true for failures which prevent a probing unit from starting at all.
    pub fn is_setup(&self) -> bool {
        self.kind().is_setup()
    }
}

/// Failure class of an [`Error`], kept where the error itself is absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ChannelOpen,
    SetTtl,
    SendFailed,
    RecvFailed,
    InvalidPacket,
    BadConfig,
}

impl ErrorKind {
    pub fn is_setup(self) -> bool {
        matches!(self, Self::ChannelOpen | Self::SetTtl)
    }
}
