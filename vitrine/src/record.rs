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

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

use crate::image::DecodedImage;

/// [`ImageRecord`] is the shared, url-keyed unit of cached image state.
///
/// A record appears as a placeholder the moment a url is first registered
/// or a load is requested for it, and is filled in place when the load
/// settles. Handles obtained before settlement observe the transition
/// through [`ImageRecord::is_loaded`] and [`ImageRecord::bitmap`].
pub struct ImageRecord {
    url: Arc<str>,
    bitmap: RwLock<Option<Arc<dyn DecodedImage>>>,
    loaded: AtomicBool,
}

impl Debug for ImageRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRecord")
            .field("url", &self.url)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl ImageRecord {
    pub(crate) fn new(url: &str, bitmap: Option<Arc<dyn DecodedImage>>) -> Self {
        let loaded = bitmap.is_some();
        Self {
            url: Arc::from(url),
            bitmap: RwLock::new(bitmap),
            loaded: AtomicBool::new(loaded),
        }
    }

    /// Url this record is keyed by. Immutable for the record's lifetime.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn url_arc(&self) -> &Arc<str> {
        &self.url
    }

    /// Decoded bitmap handle, if the record is loaded.
    pub fn bitmap(&self) -> Option<Arc<dyn DecodedImage>> {
        self.bitmap.read().clone()
    }

    /// Whether the decoded bitmap has arrived.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Fill the record in place.
    ///
    /// First writer wins; callers check [`ImageRecord::is_loaded`] under the
    /// registry lock before filling.
    pub(crate) fn fill(&self, bitmap: Arc<dyn DecodedImage>) {
        tracing::trace!(
            "[record]: fill record (url: {}, dimensions: {}x{})",
            self.url,
            bitmap.width(),
            bitmap.height()
        );
        *self.bitmap.write() = Some(bitmap);
        self.loaded.store(true, Ordering::Release);
    }
}
