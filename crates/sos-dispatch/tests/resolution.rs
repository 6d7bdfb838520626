//! 能力解析的端到端性质：特异性优先、兼容相等与零相似度等价、缓存幂等、并发注册的原子可见性。

use std::{
    sync::{
        Arc, Barrier,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use sos_dispatch::{
    capability::{
        CapabilityKey, DecoderKey, EncoderKey, ExceptionFormatKey, NamespaceTypeKey, OperationKey,
        Similarity, TypeTag,
    },
    declare_type,
    media::MediaType,
    registry::{CapabilityRegistry, Registration},
};

const SOS_20: &str = "http://www.opengis.net/sos/2.0";
const SWES_20: &str = "http://www.opengis.net/swes/2.0";

declare_type!(REQUEST = "ows.Request");
declare_type!(SERVICE_REQUEST = "ows.ServiceRequest" => [REQUEST]);
declare_type!(GET_OBSERVATION = "sos.GetObservation" => [SERVICE_REQUEST]);
declare_type!(GET_OBSERVATION_BY_ID = "sos.GetObservationById" => [GET_OBSERVATION]);
declare_type!(INSERT_SENSOR = "swes.InsertSensor" => [SERVICE_REQUEST]);

fn ns(namespace: &'static str, tag: &'static TypeTag) -> DecoderKey {
    DecoderKey::from(NamespaceTypeKey::new(namespace, tag))
}

#[test]
fn most_specific_decoder_wins_regardless_of_registration_order() {
    let registry: CapabilityRegistry<DecoderKey, str> = CapabilityRegistry::new("decoders");
    registry
        .register(Registration::new([ns(SOS_20, &REQUEST)], Arc::from("fallback")))
        .unwrap();
    registry
        .register(Registration::new(
            [ns(SOS_20, &GET_OBSERVATION)],
            Arc::from("get-observation"),
        ))
        .unwrap();
    registry
        .register(Registration::new(
            [ns(SOS_20, &SERVICE_REQUEST)],
            Arc::from("service-request"),
        ))
        .unwrap();

    let resolve = |key: DecoderKey| registry.resolve(&key).map(|hit| hit.to_string());
    assert_eq!(resolve(ns(SOS_20, &GET_OBSERVATION_BY_ID)).as_deref(), Some("get-observation"));
    assert_eq!(resolve(ns(SOS_20, &INSERT_SENSOR)).as_deref(), Some("service-request"));
    assert_eq!(resolve(ns(SOS_20, &REQUEST)).as_deref(), Some("fallback"));
    assert_eq!(resolve(ns(SWES_20, &INSERT_SENSOR)), None);
}

#[test]
fn matching_holds_exactly_when_similarity_is_zero() {
    let keys = [
        EncoderKey::from(OperationKey::new("SOS", "2.0.0", "GetCapabilities", MediaType::APPLICATION_XML)),
        EncoderKey::from(OperationKey::new("SOS", "2.0.0", "GetCapabilities", MediaType::TEXT_XML)),
        EncoderKey::from(OperationKey::new("SOS", "2.0.0", "GetCapabilities", MediaType::APPLICATION_JSON)),
        EncoderKey::from(OperationKey::new("SOS", "1.0.0", "GetCapabilities", MediaType::APPLICATION_XML)),
        EncoderKey::from(ExceptionFormatKey::new(MediaType::APPLICATION_XML)),
        EncoderKey::from(ExceptionFormatKey::new(MediaType::ANY)),
        EncoderKey::from(NamespaceTypeKey::new(SOS_20, &GET_OBSERVATION)),
        EncoderKey::from(NamespaceTypeKey::new(SOS_20, &REQUEST)),
    ];
    for lookup in &keys {
        assert_eq!(lookup.similarity_to(lookup), Similarity::EXACT, "{lookup} 必须自反");
        for candidate in &keys {
            let similarity = lookup.similarity_to(candidate);
            assert_eq!(
                lookup.matches(candidate),
                similarity.is_exact(),
                "{lookup} vs {candidate}"
            );
            if !matches!(lookup, EncoderKey::Namespace(_)) {
                assert!(
                    matches!(similarity, Similarity::EXACT | Similarity::Unrelated),
                    "仅精确匹配的键不得给出中间分数"
                );
            }
        }
    }
}

#[test]
fn operation_encoder_resolves_through_equivalent_media_type() {
    let registry: CapabilityRegistry<EncoderKey, str> = CapabilityRegistry::new("encoders");
    registry
        .register(Registration::new(
            [EncoderKey::from(OperationKey::new(
                "SOS",
                "2.0.0",
                "GetObservation",
                MediaType::APPLICATION_XML,
            ))],
            Arc::from("om-xml"),
        ))
        .unwrap();

    let lookup = EncoderKey::from(OperationKey::new(
        "SOS",
        "2.0.0",
        "GetObservation",
        MediaType::parse("text/xml; charset=UTF-8").unwrap(),
    ));
    assert_eq!(registry.resolve(&lookup).as_deref(), Some("om-xml"));
    assert_eq!(registry.resolve(&lookup).as_deref(), Some("om-xml"));
    assert_eq!(registry.scan_count(), 1, "第二次解析必须来自缓存");
}

#[test]
fn concurrent_readers_never_observe_partial_batches() {
    let registry: Arc<CapabilityRegistry<DecoderKey, str>> =
        Arc::new(CapabilityRegistry::new("decoders"));
    let done = Arc::new(AtomicBool::new(false));
    let start = Arc::new(Barrier::new(5));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let done = Arc::clone(&done);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                while !done.load(Ordering::Acquire) {
                    let by_id = registry.resolve(&ns(SOS_20, &GET_OBSERVATION_BY_ID));
                    let insert = registry.resolve(&ns(SWES_20, &INSERT_SENSOR));
                    // 批次内两个键同时发布：看到后者必然也能看到前者。
                    if insert.is_some() {
                        assert!(registry.resolve(&ns(SOS_20, &GET_OBSERVATION)).is_some());
                    }
                    if let Some(hit) = by_id {
                        assert!(matches!(&*hit, "batch-a" | "batch-b"));
                    }
                }
            })
        })
        .collect();

    start.wait();
    registry
        .register_all([
            Registration::new([ns(SOS_20, &GET_OBSERVATION)], Arc::from("batch-a")),
            Registration::new([ns(SWES_20, &INSERT_SENSOR)], Arc::from("batch-b")),
        ])
        .unwrap();
    registry
        .register(Registration::new(
            [ns(SOS_20, &GET_OBSERVATION_BY_ID)],
            Arc::from("batch-b"),
        ))
        .unwrap();
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().expect("读线程不应 panic");
    }
    assert_eq!(registry.len(), 3);
}
