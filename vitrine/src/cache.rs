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

use std::{fmt::Debug, sync::Arc};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    image::DecodedImage,
    loader::ImageLoader,
    record::ImageRecord,
    registry::{ImageFetch, ImageRegistry, OwnerId},
};

/// Owner-scoped name cache over the shared [`ImageRegistry`].
///
/// Each consumer gets its own `NamedImageCache` and refers to images by
/// symbolic name. Any number of names may alias one url, while a name never
/// aliases two urls within the same owner. Url-level storage, loading, and
/// load deduplication are delegated to the registry; clearing or dropping
/// the cache detaches its owner, releasing shared records it was the last
/// referrer of.
pub struct NamedImageCache {
    registry: ImageRegistry,
    loader: Arc<dyn ImageLoader>,
    owner: OwnerId,
    names: Mutex<NameState>,
}

#[derive(Default)]
struct NameState {
    by_name: HashMap<String, Arc<ImageRecord>>,
    names_by_url: HashMap<Arc<str>, Vec<String>>,
}

impl Debug for NamedImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedImageCache")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl NamedImageCache {
    /// Create a cache over the process-wide registry instance.
    pub fn new(loader: Arc<dyn ImageLoader>) -> Self {
        Self::with_registry(ImageRegistry::instance(), loader)
    }

    /// Create a cache over an explicitly provided registry.
    pub fn with_registry(registry: ImageRegistry, loader: Arc<dyn ImageLoader>) -> Self {
        Self {
            registry,
            loader,
            owner: OwnerId::unique(),
            names: Mutex::new(NameState::default()),
        }
    }

    /// The identity this cache attaches to shared records.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Bind `name` to `url` and register the image with the shared registry,
    /// optionally with already decoded data.
    ///
    /// Fails with [`crate::ErrorKind::NameConflict`] if `name` is bound to a
    /// different url in this cache, leaving all state untouched.
    /// Re-registering the same name/url pair is idempotent.
    pub fn register_image(
        &self,
        name: &str,
        url: &str,
        data: Option<Arc<dyn DecodedImage>>,
    ) -> Result<Arc<ImageRecord>> {
        let mut names = self.names.lock();
        Self::ensure_name_free(&names, name, url)?;
        tracing::trace!("[image cache]: register image (owner: {:?}, name: {name}, url: {url})", self.owner);
        let record = self.registry.register_image(self.owner, url, data);
        Self::bind(&mut names, name, &record);
        Ok(record)
    }

    /// Bind `name` to `url` and attach to the shared registry, starting (or
    /// joining) a load when `start_load` is set.
    ///
    /// The record is synchronously visible through the lookup methods as a
    /// placeholder while the load is in flight; the returned [`ImageFetch`]
    /// resolves once it settles. Name conflicts fail as in
    /// [`NamedImageCache::register_image`], without touching the registry.
    pub fn add_image(
        &self,
        name: &str,
        url: &str,
        start_load: bool,
    ) -> Result<(Arc<ImageRecord>, ImageFetch)> {
        let mut names = self.names.lock();
        Self::ensure_name_free(&names, name, url)?;
        tracing::trace!("[image cache]: add image (owner: {:?}, name: {name}, url: {url})", self.owner);
        let (record, fetch) = self
            .registry
            .add_image(self.owner, url, self.loader.as_ref(), start_load);
        Self::bind(&mut names, name, &record);
        Ok((record, fetch))
    }

    /// Look up the record bound to `name`. Never triggers a load.
    pub fn find_image_by_name(&self, name: &str) -> Option<Arc<ImageRecord>> {
        self.names.lock().by_name.get(name).cloned()
    }

    /// Look up the record for `url`, if any name of this cache is bound to
    /// it. Never triggers a load.
    pub fn find_image_by_url(&self, url: &str) -> Option<Arc<ImageRecord>> {
        let names = self.names.lock();
        let name = names.names_by_url.get(url)?.first()?;
        names.by_name.get(name).cloned()
    }

    /// All names bound to `url`, in registration order; `None` if the url is
    /// unknown to this cache.
    pub fn find_names(&self, url: &str) -> Option<Vec<String>> {
        self.names.lock().names_by_url.get(url).cloned()
    }

    /// Whether `name` is bound in this cache.
    pub fn has_name(&self, name: &str) -> bool {
        self.names.lock().by_name.contains_key(name)
    }

    /// Whether any name of this cache is bound to `url`.
    pub fn has_url(&self, url: &str) -> bool {
        self.names.lock().names_by_url.contains_key(url)
    }

    /// Number of names bound in this cache.
    pub fn number_of_names(&self) -> usize {
        self.names.lock().by_name.len()
    }

    /// Number of distinct urls bound in this cache.
    pub fn number_of_urls(&self) -> usize {
        self.names.lock().names_by_url.len()
    }

    /// Unbind `name`; returns whether it was bound. When it was the url's
    /// last name in this cache, the owner is detached from the shared
    /// registry for that url as well.
    pub fn remove_image(&self, name: &str) -> bool {
        let mut names = self.names.lock();
        let Some(record) = names.by_name.remove(name) else {
            return false;
        };
        let url = record.url_arc().clone();
        let unbound = match names.names_by_url.get_mut(&url) {
            Some(bound) => {
                bound.retain(|bound_name| bound_name != name);
                bound.is_empty()
            }
            None => false,
        };
        if unbound {
            tracing::trace!("[image cache]: drop url (owner: {:?}, url: {url})", self.owner);
            names.names_by_url.remove(&url);
            self.registry.remove_image(self.owner, &url);
        }
        true
    }

    /// Remove every binding and detach this owner from the shared registry,
    /// releasing records it was the last referrer of.
    pub fn clear(&self) {
        let mut names = self.names.lock();
        tracing::debug!(
            "[image cache]: clear (owner: {:?}, names: {})",
            self.owner,
            names.by_name.len()
        );
        names.by_name.clear();
        names.names_by_url.clear();
        self.registry.clear(self.owner);
    }

    fn ensure_name_free(names: &NameState, name: &str, url: &str) -> Result<()> {
        match names.by_name.get(name) {
            Some(existing) if existing.url() != url => Err(Error::NameConflict {
                name: name.to_owned(),
                existing: existing.url_arc().clone(),
                requested: Arc::from(url),
            }),
            _ => Ok(()),
        }
    }

    fn bind(names: &mut NameState, name: &str, record: &Arc<ImageRecord>) {
        let bound = names
            .names_by_url
            .entry_ref(record.url())
            .or_insert_with(Vec::new);
        if !bound.iter().any(|bound_name| bound_name == name) {
            bound.push(name.to_owned());
        }
        names.by_name.insert(name.to_owned(), record.clone());
    }
}

impl Drop for NamedImageCache {
    fn drop(&mut self) {
        self.registry.clear(self.owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        test_utils::{TestBitmap, TestLoader},
    };

    fn fixture() -> (NamedImageCache, TestLoader, ImageRegistry) {
        let registry = ImageRegistry::new();
        let loader = TestLoader::gated(37, 36);
        let cache = NamedImageCache::with_registry(registry.clone(), Arc::new(loader.clone()));
        (cache, loader, registry)
    }

    #[test]
    fn test_empty() {
        let (cache, _, _) = fixture();
        assert_eq!(cache.number_of_names(), 0);
        assert_eq!(cache.number_of_urls(), 0);
        assert!(cache.find_names("xxx").is_none());
        assert!(cache.find_image_by_name("xxx").is_none());
        assert!(cache.find_image_by_url("xxx").is_none());
    }

    #[test]
    fn test_register_image() {
        let (cache, _, _) = fixture();
        let data = TestBitmap::shared(16, 16);

        let record = cache
            .register_image("testImage", "httpx://naxos.de", Some(data.clone()))
            .unwrap();

        assert_eq!(cache.number_of_names(), 1);
        assert_eq!(cache.number_of_urls(), 1);
        assert!(cache.find_image_by_name("xxx").is_none());
        assert!(cache.find_image_by_url("xxx").is_none());

        let by_name = cache.find_image_by_name("testImage").unwrap();
        let by_url = cache.find_image_by_url("httpx://naxos.de").unwrap();
        assert!(Arc::ptr_eq(&by_name, &record));
        assert!(Arc::ptr_eq(&by_url, &record));
        assert!(Arc::ptr_eq(&by_name.bitmap().unwrap(), &data));
        assert!(Arc::ptr_eq(&by_url.bitmap().unwrap(), &data));
    }

    #[test]
    fn test_clear() {
        let (cache, _, registry) = fixture();

        cache
            .register_image("testImage", "httpx://naxos.de", Some(TestBitmap::shared(16, 16)))
            .unwrap();
        assert_eq!(cache.number_of_names(), 1);
        assert_eq!(cache.number_of_urls(), 1);
        assert_eq!(registry.size(), 1);

        cache.clear();

        assert_eq!(cache.number_of_names(), 0);
        assert_eq!(cache.number_of_urls(), 0);
        assert_eq!(registry.size(), 0);
    }

    #[test]
    fn test_add_images() {
        let (cache, _, _) = fixture();
        let data1 = TestBitmap::shared(16, 16);
        let data2 = TestBitmap::shared(32, 32);

        cache
            .register_image("testImage1", "httpx://naxos.de", Some(data1.clone()))
            .unwrap();
        cache
            .register_image("testImage2", "httpx://naxos.de-2", Some(data2.clone()))
            .unwrap();

        assert_eq!(cache.number_of_names(), 2);
        assert_eq!(cache.number_of_urls(), 2);

        let image1 = cache.find_image_by_name("testImage1").unwrap();
        let image2 = cache.find_image_by_name("testImage2").unwrap();
        assert!(Arc::ptr_eq(&image1.bitmap().unwrap(), &data1));
        assert!(Arc::ptr_eq(&image2.bitmap().unwrap(), &data2));
        let by_url1 = cache.find_image_by_url("httpx://naxos.de").unwrap();
        let by_url2 = cache.find_image_by_url("httpx://naxos.de-2").unwrap();
        assert!(Arc::ptr_eq(&by_url1.bitmap().unwrap(), &data1));
        assert!(Arc::ptr_eq(&by_url2.bitmap().unwrap(), &data2));

        assert!(cache.has_name("testImage1"));
        assert!(cache.has_name("testImage2"));
        assert!(cache.has_url("httpx://naxos.de"));
        assert!(cache.has_url("httpx://naxos.de-2"));
    }

    #[test]
    fn test_add_images_with_same_url_but_differing_names() {
        let (cache, _, registry) = fixture();
        let data1 = TestBitmap::shared(16, 16);
        let data2 = TestBitmap::shared(32, 32);

        cache
            .register_image("testImage1", "httpx://naxos.de", Some(data1.clone()))
            .unwrap();
        cache
            .register_image("testImage2", "httpx://naxos.de", Some(data2))
            .unwrap();

        assert_eq!(cache.number_of_names(), 2, "should have 2 names");
        assert_eq!(cache.number_of_urls(), 1, "should have just 1 url");
        assert_eq!(registry.size(), 1);

        // first writer wins; both names resolve to the same record
        let image1 = cache.find_image_by_name("testImage1").unwrap();
        let image2 = cache.find_image_by_name("testImage2").unwrap();
        assert!(Arc::ptr_eq(&image1, &image2));
        assert!(Arc::ptr_eq(&image1.bitmap().unwrap(), &data1));
        assert!(Arc::ptr_eq(&image2.bitmap().unwrap(), &data1));

        assert_eq!(
            cache.find_names("httpx://naxos.de").unwrap(),
            vec!["testImage1".to_owned(), "testImage2".to_owned()]
        );
    }

    #[test]
    fn test_add_images_with_same_name_but_differing_urls() {
        let (cache, _, registry) = fixture();

        cache.register_image("testImage", "httpx://naxos.de", None).unwrap();
        let err = cache
            .register_image("testImage", "httpx://naxos.de-2", None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NameConflict);

        // the original binding stays intact
        let record = cache.find_image_by_name("testImage").unwrap();
        assert_eq!(record.url(), "httpx://naxos.de");
        assert_eq!(cache.number_of_names(), 1);
        assert_eq!(cache.number_of_urls(), 1);
        assert!(!cache.has_url("httpx://naxos.de-2"));
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn test_register_image_idempotent() {
        let (cache, _, registry) = fixture();
        let data = TestBitmap::shared(16, 16);

        let first = cache
            .register_image("testImage", "httpx://naxos.de", Some(data))
            .unwrap();
        let second = cache.register_image("testImage", "httpx://naxos.de", None).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.number_of_names(), 1);
        assert_eq!(cache.number_of_urls(), 1);
        assert_eq!(cache.find_names("httpx://naxos.de").unwrap(), vec!["testImage".to_owned()]);
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn test_remove_image_by_name() {
        let (cache, _, registry) = fixture();

        cache
            .register_image("testImage1", "httpx://naxos.de", Some(TestBitmap::shared(16, 16)))
            .unwrap();
        cache.register_image("testImage2", "httpx://naxos.de", None).unwrap();

        assert!(cache.remove_image("testImage1"));
        assert!(!cache.remove_image("testImage1"));

        // the url stays bound through its remaining name
        assert!(cache.has_name("testImage2"));
        assert!(cache.has_url("httpx://naxos.de"));
        assert_eq!(
            cache.find_names("httpx://naxos.de").unwrap(),
            vec!["testImage2".to_owned()]
        );
        assert_eq!(registry.size(), 1);

        assert!(cache.remove_image("testImage2"));
        assert_eq!(cache.number_of_names(), 0);
        assert_eq!(cache.number_of_urls(), 0);
        assert_eq!(registry.size(), 0);
    }

    #[test]
    fn test_cross_owner_sharing() {
        let registry = ImageRegistry::new();
        let loader = TestLoader::new(37, 36);
        let cache1 = NamedImageCache::with_registry(registry.clone(), Arc::new(loader.clone()));
        let cache2 = NamedImageCache::with_registry(registry.clone(), Arc::new(loader.clone()));
        let data = TestBitmap::shared(16, 16);

        cache1
            .register_image("one", "httpx://naxos.de", Some(data.clone()))
            .unwrap();
        cache2
            .register_image("uno", "httpx://naxos.de", Some(TestBitmap::shared(32, 32)))
            .unwrap();

        assert_eq!(registry.size(), 1);
        let r1 = cache1.find_image_by_name("one").unwrap();
        let r2 = cache2.find_image_by_name("uno").unwrap();
        assert!(Arc::ptr_eq(&r1, &r2));
        assert!(Arc::ptr_eq(&r1.bitmap().unwrap(), &data));

        cache1.clear();
        assert_eq!(registry.size(), 1);
        assert!(cache2.find_image_by_name("uno").is_some());

        cache2.clear();
        assert_eq!(registry.size(), 0);
    }

    #[test]
    fn test_drop_detaches_owner() {
        let registry = ImageRegistry::new();
        let loader = TestLoader::new(37, 36);
        {
            let cache = NamedImageCache::with_registry(registry.clone(), Arc::new(loader));
            cache
                .register_image("testImage", "httpx://naxos.de", Some(TestBitmap::shared(16, 16)))
                .unwrap();
            assert_eq!(registry.size(), 1);
        }
        assert_eq!(registry.size(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_add_image() {
        let (cache, loader, _) = fixture();

        let (record, fetch) = cache
            .add_image("headshot.png", "../test/resources/headshot.png", true)
            .unwrap();

        assert!(!record.is_loaded());
        assert!(record.bitmap().is_none());
        let placeholder = cache.find_image_by_name("headshot.png").unwrap();
        assert!(Arc::ptr_eq(&record, &placeholder));

        loader.release();
        fetch.await.unwrap();

        let loaded = cache.find_image_by_name("headshot.png").unwrap();
        assert!(loaded.is_loaded());
        let bitmap = loaded.bitmap().unwrap();
        assert_eq!(bitmap.width(), 37);
        assert_eq!(bitmap.height(), 36);
    }

    #[test_log::test(tokio::test)]
    async fn test_add_image_name_conflict() {
        let (cache, loader, _) = fixture();

        cache.register_image("testImage", "httpx://naxos.de", None).unwrap();
        let err = cache.add_image("testImage", "httpx://naxos.de-2", true).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NameConflict);
        assert_eq!(loader.calls(), 0);
        assert_eq!(cache.number_of_urls(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_concurrent_add_image_across_owners() {
        let registry = ImageRegistry::new();
        let loader = TestLoader::gated(37, 36);
        let cache1 = NamedImageCache::with_registry(registry.clone(), Arc::new(loader.clone()));
        let cache2 = NamedImageCache::with_registry(registry.clone(), Arc::new(loader.clone()));

        let (r1, f1) = cache1.add_image("left", "headshot.png", true).unwrap();
        let (r2, f2) = cache2.add_image("right", "headshot.png", true).unwrap();

        assert_eq!(loader.calls(), 1);
        assert!(Arc::ptr_eq(&r1, &r2));

        loader.release();
        f1.await.unwrap();
        f2.await.unwrap();

        assert!(cache1.find_image_by_name("left").unwrap().is_loaded());
        assert!(cache2.find_image_by_name("right").unwrap().is_loaded());
        assert_eq!(registry.size(), 1);
    }
}
