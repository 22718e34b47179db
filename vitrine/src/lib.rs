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

//! vitrine is a shared, reference-counted image resource cache for
//! rendering hosts.
//!
//! It sits between a rendering system and any number of mutually
//! independent consumers ("owners") that refer to images by symbolic name.
//! The decoded bitmap for a url is fetched and stored once, no matter how
//! many owners or names reference it:
//!
//! - concurrent loads of one url collapse into a single flight shared by
//!   every caller;
//! - any number of names may alias one url within an owner, while a name
//!   never aliases two urls;
//! - owners are tracked per record, and a record is released exactly when
//!   its last owner detaches;
//! - cache state is synchronously visible while population is
//!   asynchronous: a placeholder record appears the moment a load is
//!   requested.
//!
//! [`ImageRegistry`] is the url-keyed store shared across the process;
//! [`NamedImageCache`] is the per-owner name layer on top of it. The
//! fetch/decode primitive is injected behind [`ImageLoader`].

mod cache;
mod error;
mod image;
mod loader;
mod record;
mod registry;

pub mod prelude;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use crate::{
    cache::NamedImageCache,
    error::{Error, ErrorKind, Result},
    image::DecodedImage,
    loader::{BoxLoadError, ImageLoader, LoadFuture},
    record::ImageRecord,
    registry::{ImageFetch, ImageRegistry, OwnerId},
};
