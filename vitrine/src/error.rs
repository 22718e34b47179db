// Copyright 2026 vitrine Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

/// Image cache error.
///
/// `Error` is cheap to clone: a single load failure is delivered to every
/// fetch attached to the failed flight.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A symbolic name is already bound to a different url within one owner.
    #[error("name {name:?} is already bound to url {existing:?}, refusing {requested:?}")]
    NameConflict {
        /// The conflicting symbolic name.
        name: String,
        /// Url the name is currently bound to.
        existing: Arc<str>,
        /// Url the caller tried to bind.
        requested: Arc<str>,
    },
    /// Fetching or decoding an image failed.
    ///
    /// The registry evicts the record on failure so a later request can
    /// retry from scratch.
    #[error("image load failed (url: {url:?})")]
    Load {
        /// Url of the failed load.
        url: Arc<str>,
        /// The underlying loader failure.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub(crate) fn load(url: Arc<str>, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Load {
            url,
            source: Arc::from(source.into()),
        }
    }

    /// Get the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NameConflict { .. } => ErrorKind::NameConflict,
            Self::Load { .. } => ErrorKind::Load,
        }
    }
}

/// ErrorKind is all kinds of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Name/url binding conflict, see [`Error::NameConflict`].
    NameConflict,
    /// Load failure, see [`Error::Load`].
    Load,
}

/// Image cache result.
pub type Result<T> = std::result::Result<T, Error>;
