use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dataload_rs::{AttributeLoader, BatchFn, BatchingLoader, FetchResult, ObjectAttributeLoader};

#[derive(Debug, Clone)]
struct NotFound(i64);

// Trivial in-memory fetcher, keyed by movie id, fetching titles. Misses get
// their own `NotFound` error positionally; hits alongside them in the same
// batch are unaffected.
struct MovieTitlesById {
    titles: HashMap<i64, String>,
}

#[async_trait]
impl BatchFn<i64, String> for MovieTitlesById {
    type Error = NotFound;

    async fn load(&self, keys: &[i64]) -> FetchResult<String, NotFound> {
        if keys.iter().all(|key| self.titles.contains_key(key)) {
            let values = keys.iter().map(|key| self.titles[key].clone()).collect();
            return FetchResult::ok(values);
        }

        let values = keys.iter().map(|key| self.titles.get(key).cloned().unwrap_or_default()).collect();
        let errors = keys.iter().map(|key| (!self.titles.contains_key(key)).then(|| NotFound(*key))).collect();
        FetchResult::partial(values, errors)
    }
}

#[tokio::main]
async fn main() {
    let titles = HashMap::from([
        (2001, "a space odyssey".to_owned()),
        (7, "samurai".to_owned()),
        (12, "angry men".to_owned()),
    ]);

    let object_loader: ObjectAttributeLoader<i64, String, NotFound> = ObjectAttributeLoader::builder()
        .with_object_type("movie", move || {
            AttributeLoader::builder()
                .with_attribute("title", move || {
                    BatchingLoader::new(MovieTitlesById { titles }, 10, Duration::from_millis(5))
                })
                .build()
        })
        .build();

    let movie = dataload_rs::ObjectType::from("movie");
    let title = dataload_rs::Attribute::from("title");

    assert_eq!(object_loader.load(&movie, &title, 7).await.as_deref(), Ok("samurai"));

    let hits = object_loader.load_all(&movie, &title, vec![12, 2001]).await;
    assert_eq!(hits[0].as_deref(), Ok("angry men"));
    assert_eq!(hits[1].as_deref(), Ok("a space odyssey"));

    let miss = object_loader.load(&movie, &title, 404).await;
    assert!(miss.is_err());
}
