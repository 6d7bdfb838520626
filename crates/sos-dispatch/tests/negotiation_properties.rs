//! 媒体类型与内容协商的代数性质。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：兼容判定被操作键、异常格式化键与协商共同依赖，一旦失去对称性，
//!   “客户端请求 `text/xml`、编码器注册 `application/xml`”这类组合会因比较方向不同而得到不同结果；
//!   打印与解析互逆则保证协商结果写回 `Content-Type` 后可被下游原样读回。
//! - **设计手法 (How)**：以 Proptest 生成大小写混合的合法 token 与参数（含需要加引号的值、
//!   重复出现的同名参数），分别断言：
//!   1. `a.is_compatible(b) == b.is_compatible(a)`；
//!   2. `parse(display(m)) == m`；
//!   3. 权重互不相同时，协商总选中权重最高且可生成的条目。
//!
//! # 合同与边界 (What)
//!
//! - 生成的参数键以 `p` 或固定的 `charset`/`level` 开头，避免与 `q` 冲突；`q` 单独生成并保证落在 `[0, 1]`；
//! - 重复参数只能经解析得到，[`MediaType::with_parameter`] 会替换同名项。

use proptest::prelude::*;
use sos_dispatch::media::{AcceptList, ContentNegotiator, MediaType};

fn token() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9+.-]{0,7}"
}

fn main_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("text".to_owned()),
        Just("APPLICATION".to_owned()),
        Just("*".to_owned()),
        token(),
    ]
}

fn media_type() -> impl Strategy<Value = MediaType> {
    let subtype = prop_oneof![
        Just("xml".to_owned()),
        Just("Json".to_owned()),
        Just("*".to_owned()),
        token(),
    ];
    let key = prop_oneof![Just("CharSet".to_owned()), "[pP][a-zA-Z]{0,4}"];
    let parameters = prop::collection::vec((key, "[A-Za-z0-9 ;,=\"\\\\-]{0,8}"), 0..3);
    (main_type(), subtype, parameters).prop_map(|(main, sub, parameters)| {
        let sub = if main == "*" { "*".to_owned() } else { sub };
        parameters
            .into_iter()
            .fold(MediaType::new(main, sub), |acc, (key, value)| {
                acc.with_parameter(key, value)
            })
    })
}

/// 经解析得到、同名参数可能重复的媒体类型。
fn repeated_parameters() -> impl Strategy<Value = MediaType> {
    let key = prop_oneof![Just("charset"), Just("Level")];
    let parameters = prop::collection::vec((key, "[a-cA-C]{1,2}"), 1..4);
    (prop_oneof![Just("text/xml"), Just("Application/XML"), Just("*/*")], parameters).prop_map(
        |(essence, parameters)| {
            let text = parameters
                .iter()
                .fold(essence.to_owned(), |acc, (key, value)| format!("{acc}; {key}={value}"));
            MediaType::parse(&text).expect("生成的文本必须合法")
        },
    )
}

fn any_media_type() -> impl Strategy<Value = MediaType> {
    prop_oneof![media_type(), repeated_parameters()]
}

fn concrete_types() -> impl Strategy<Value = Vec<MediaType>> {
    prop::collection::btree_set(("[a-z]{1,6}", "[a-z]{1,6}"), 1..6).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(main, sub)| MediaType::new(main, sub))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_compatibility_is_symmetric(left in any_media_type(), right in any_media_type()) {
        prop_assert_eq!(left.is_compatible(&right), right.is_compatible(&left));
    }

    #[test]
    fn prop_compatibility_is_reflexive(media in any_media_type()) {
        prop_assert!(media.is_compatible(&media));
    }

    #[test]
    fn prop_display_then_parse_restores_value(media in any_media_type(), quality in 0u32..=1000) {
        let weighted = media.with_parameter("q", format!("{}", f64::from(quality) / 1000.0));
        for candidate in [media, weighted] {
            let printed = candidate.to_string();
            let parsed = MediaType::parse(&printed);
            prop_assert_eq!(parsed.as_ref(), Ok(&candidate), "printed: {}", printed);
        }
    }

    #[test]
    fn prop_disjoint_qualities_pick_highest_producible(
        types in concrete_types(),
        producible_mask in prop::collection::vec(any::<bool>(), 6),
    ) {
        // 权重按位置递减且互不相同。
        let accepted: Vec<MediaType> = types
            .iter()
            .enumerate()
            .map(|(index, media)| {
                let quality = 1.0 - (index as f64) * 0.1;
                media.with_parameter("q", format!("{quality:.1}"))
            })
            .collect();
        let producible: Vec<MediaType> = types
            .iter()
            .zip(&producible_mask)
            .filter(|(_, keep)| **keep)
            .map(|(media, _)| media.clone())
            .collect();

        // 打乱客户端书写顺序，结果只取决于权重。
        let mut shuffled = accepted.clone();
        shuffled.reverse();
        let list = AcceptList::from_types(shuffled);

        let outcome = ContentNegotiator::new().negotiate(&list, &producible);
        match types.iter().find(|media| producible.contains(media)) {
            Some(expected) => {
                let negotiated = outcome.expect("存在可生成的可接受类型");
                prop_assert_eq!(negotiated.selected(), expected);
                prop_assert_eq!(negotiated.content_type(), expected);
            }
            None => prop_assert!(outcome.is_err()),
        }
    }
}
