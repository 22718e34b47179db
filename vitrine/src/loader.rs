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

use futures_util::future::BoxFuture;

use crate::image::DecodedImage;

/// Error type loaders may fail with.
pub type BoxLoadError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Future returned by [`ImageLoader::load`].
pub type LoadFuture = BoxFuture<'static, std::result::Result<Arc<dyn DecodedImage>, BoxLoadError>>;

/// Platform fetch-and-decode primitive.
///
/// The registry treats loading as one opaque async operation: given a url,
/// it either yields a decoded bitmap handle or fails. `load` itself must
/// not block; the returned future does the work.
pub trait ImageLoader: Send + Sync + 'static {
    /// Fetch and decode the image at `url`.
    fn load(&self, url: &str) -> LoadFuture;
}
