//! Integration tests for partition and bucket routing

mod common;

use lakemeta::{route, BucketFunction, BucketRouter, Datum, LakeError};
use proptest::prelude::*;
use xxhash_rust::xxh3::xxh3_64;

use common::*;

proptest! {
    #[test]
    fn test_route_is_deterministic(
        id in any::<i64>(),
        country in "[A-Z]{2}",
        name in ".{0,16}",
        buckets in 1u32..64,
    ) {
        let schema = keyed_schema(buckets);
        let r = row(id, &country, &name);

        let (p1, b1) = route(&r, &schema).unwrap();
        let (p2, b2) = route(&r, &keyed_schema(buckets)).unwrap();
        prop_assert_eq!(&p1, &p2);
        prop_assert_eq!(b1, b2);
        prop_assert!(b1 < buckets);
        prop_assert_eq!(p1, vec![Datum::String(country.clone())]);

        // Value columns never move a keyed row
        let (_, b3) = route(&row(id, &country, "something else"), &schema).unwrap();
        prop_assert_eq!(b1, b3);
    }

    #[test]
    fn test_bucket_is_pinned_xxh3_of_canonical_bytes(
        id in any::<i64>(),
        country in "[A-Z]{2}",
        buckets in 1u32..64,
    ) {
        let schema = keyed_schema(buckets);
        let (_, bucket) = route(&row(id, &country, "n"), &schema).unwrap();

        let mut canonical = Vec::new();
        Datum::String(country.clone()).write_canonical(&mut canonical);
        Datum::String(country).write_canonical(&mut canonical);
        Datum::Long(id).write_canonical(&mut canonical);
        prop_assert_eq!(bucket, (xxh3_64(&canonical) % buckets as u64) as u32);
    }
}

#[test]
fn test_append_table_hashes_whole_row() {
    let schema = append_schema();
    let router = BucketRouter::new(&schema).unwrap();
    assert_eq!(router.function(), BucketFunction::Xxh3V1);
    assert_eq!(router.total_buckets(), 1);

    let r = router.route(&row(1, "US", "a")).unwrap();
    assert!(r.partition.is_empty());
    assert_eq!(r.bucket, 0);
}

#[test]
fn test_arity_mismatch() {
    let schema = keyed_schema(4);
    assert!(matches!(
        route(&[Datum::Long(1), Datum::Null], &schema),
        Err(LakeError::SchemaMismatch(_))
    ));
}
