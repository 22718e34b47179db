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

/// Opaque handle to a decoded bitmap.
///
/// The cache never inspects pixel data; it only carries the handle from the
/// loader to the rendering side, which reads the dimensions to build its
/// GPU resource. The backing storage is freed when the last handle clone is
/// dropped.
pub trait DecodedImage: Send + Sync + 'static {
    /// Width of the decoded image in pixels.
    fn width(&self) -> u32;

    /// Height of the decoded image in pixels.
    fn height(&self) -> u32;
}
