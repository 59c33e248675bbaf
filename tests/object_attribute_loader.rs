use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dataload_rs::{AttributeLoader, BatchFn, BatchingLoader, FetchResult, LoadingError, ObjectAttributeLoader};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Title(String);

struct TitlesById {
    titles: HashMap<i64, String>,
}

#[async_trait]
impl BatchFn<i64, Title> for TitlesById {
    type Error = String;

    async fn load(&self, keys: &[i64]) -> FetchResult<Title, String> {
        FetchResult::ok(keys.iter().map(|k| Title(self.titles[k].clone())).collect())
    }
}

fn movie_loader() -> ObjectAttributeLoader<i64, Title, String> {
    let titles = HashMap::from([(1, "a space odyssey".to_owned())]);

    ObjectAttributeLoader::builder()
        .with_object_type("movie", move || {
            AttributeLoader::builder()
                .with_attribute("title", move || BatchingLoader::new(TitlesById { titles }, 0, Duration::from_millis(5)))
                .build()
        })
        .build()
}

#[tokio::test]
async fn load_routes_through_object_type_and_attribute() {
    let loader = movie_loader();
    let movie = dataload_rs::ObjectType::from("movie");
    let title = dataload_rs::Attribute::from("title");

    assert_eq!(loader.load(&movie, &title, 1).await, Ok(Title("a space odyssey".to_owned())));
}

#[tokio::test]
async fn unregistered_object_type_is_a_routing_error() {
    let loader = movie_loader();
    let unknown = dataload_rs::ObjectType::from("unknown");
    let title = dataload_rs::Attribute::from("title");

    let err = loader.load(&unknown, &title, 1).await.unwrap_err();
    assert!(matches!(err, LoadingError::ObjectTypeNotRegistered(_)));
    assert!(!dataload_rs::is_loading_error(&err));
}

#[tokio::test]
async fn unregistered_attribute_on_a_known_object_type_is_still_a_routing_error() {
    let loader = movie_loader();
    let movie = dataload_rs::ObjectType::from("movie");
    let runtime = dataload_rs::Attribute::from("runtime_minutes");

    let err = loader.load(&movie, &runtime, 1).await.unwrap_err();
    assert!(matches!(err, LoadingError::AttributeNotRegistered(_)));
}

#[tokio::test]
async fn load_all_reports_the_same_routing_error_for_every_key() {
    let loader = movie_loader();
    let unknown = dataload_rs::ObjectType::from("unknown");
    let title = dataload_rs::Attribute::from("title");

    let results = loader.load_all(&unknown, &title, vec![1, 2, 3]).await;
    assert_eq!(results.len(), 3);
    for result in results {
        assert!(matches!(result.unwrap_err(), LoadingError::ObjectTypeNotRegistered(_)));
    }
}

#[test]
fn object_types_are_constructed_lazily_and_at_most_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let construct_count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&construct_count);

    let loader: ObjectAttributeLoader<i64, Title, String> = ObjectAttributeLoader::builder()
        .with_object_type("movie", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            AttributeLoader::builder().build()
        })
        .build();

    assert_eq!(construct_count.load(Ordering::SeqCst), 0);

    let movie = dataload_rs::ObjectType::from("movie");
    let title = dataload_rs::Attribute::from("title");
    loader.prime(&movie, &title, 1, Title("x".to_owned()));
    loader.prime(&movie, &title, 2, Title("y".to_owned()));

    assert_eq!(construct_count.load(Ordering::SeqCst), 1);
}
