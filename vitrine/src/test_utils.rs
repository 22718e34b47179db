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

//! Utilities for testing.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use futures_util::FutureExt;
use tokio::sync::Semaphore;

use crate::{
    image::DecodedImage,
    loader::{ImageLoader, LoadFuture},
};

/// Fixed-dimension bitmap standing in for platform decoded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestBitmap {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl TestBitmap {
    /// Create a shared bitmap handle with the given dimensions.
    pub fn shared(width: u32, height: u32) -> Arc<dyn DecodedImage> {
        Arc::new(Self { width, height })
    }
}

impl DecodedImage for TestBitmap {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// A loader that yields fixed-dimension bitmaps and records every
/// invocation.
#[derive(Debug, Clone)]
pub struct TestLoader {
    state: Arc<LoaderState>,
}

#[derive(Debug)]
struct LoaderState {
    width: u32,
    height: u32,
    calls: AtomicUsize,
    fail: AtomicBool,
    gated: bool,
    gate: Semaphore,
}

impl TestLoader {
    /// Loader whose loads settle as soon as their futures are polled.
    pub fn new(width: u32, height: u32) -> Self {
        Self::build(width, height, false)
    }

    /// Loader that holds every load until [`TestLoader::release`], so tests
    /// can observe in-flight state deterministically.
    pub fn gated(width: u32, height: u32) -> Self {
        Self::build(width, height, true)
    }

    fn build(width: u32, height: u32, gated: bool) -> Self {
        Self {
            state: Arc::new(LoaderState {
                width,
                height,
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                gated,
                gate: Semaphore::new(0),
            }),
        }
    }

    /// Number of loader invocations so far.
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Make subsequent settlements fail (or succeed again).
    pub fn set_fail(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::SeqCst);
    }

    /// Let one held load settle.
    pub fn release(&self) {
        self.state.gate.add_permits(1);
    }
}

impl ImageLoader for TestLoader {
    fn load(&self, url: &str) -> LoadFuture {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.clone();
        let url = url.to_owned();
        async move {
            if state.gated {
                state.gate.acquire().await.expect("gate closed").forget();
            }
            if state.fail.load(Ordering::SeqCst) {
                return Err(format!("synthetic load failure (url: {url})").into());
            }
            Ok(TestBitmap::shared(state.width, state.height))
        }
        .boxed()
    }
}
