use std::{
    collections::{HashSet, VecDeque},
    fmt,
    hash::{Hash, Hasher},
};

/// `TypeTag` 是负载类型的静态能力标签，附带显式声明的父标签链。
///
/// # 设计背景（Why）
/// - 解析注册表需要“类型距离”：精确类型得 0 分，每向上泛化一级加 1，无关类型不可匹配；
/// - 运行期反射在 Rust 中既不可用也不可取，因此以 `static` 声明“标签 + 父标签”表，距离在该表上计算。
///
/// # 逻辑解析（How）
/// - 每个标签以名称标识，`supertypes` 列出直接父标签（可有多个，类似“父类 + 已实现接口”）；
/// - [`distance_to`](Self::distance_to) 以广度优先遍历父链，返回到达目标的最短层数，遍历带访问集合以容忍环。
///
/// # 契约说明（What）
/// - 相等性与哈希只比较名称，名称须全局唯一；
/// - 通过 [`declare_type!`](crate::declare_type) 宏或 [`TypeTag::new`] 以 `static` 形式声明。
///
/// ```rust
/// use sos_dispatch::capability::TypeTag;
///
/// static REQUEST: TypeTag = TypeTag::new("ows.Request", &[]);
/// static GET_OBSERVATION: TypeTag = TypeTag::new("sos.GetObservation", &[&REQUEST]);
///
/// assert_eq!(GET_OBSERVATION.distance_to(&GET_OBSERVATION), Some(0));
/// assert_eq!(GET_OBSERVATION.distance_to(&REQUEST), Some(1));
/// assert_eq!(REQUEST.distance_to(&GET_OBSERVATION), None);
/// ```
pub struct TypeTag {
    name: &'static str,
    supertypes: &'static [&'static TypeTag],
}

impl TypeTag {
    /// 声明一个类型标签。
    pub const fn new(name: &'static str, supertypes: &'static [&'static TypeTag]) -> Self {
        Self { name, supertypes }
    }

    /// 标签名称。
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// 直接父标签。
    pub const fn supertypes(&self) -> &'static [&'static TypeTag] {
        self.supertypes
    }

    /// 计算 `self` 向上泛化到 `ancestor` 所需的最少层数。
    ///
    /// # 契约说明（What）
    /// - 相同标签返回 `Some(0)`；
    /// - `ancestor` 不在 `self` 的父链闭包中时返回 `None`；
    /// - 方向敏感：父标签到子标签的距离恒为 `None`。
    pub fn distance_to(&self, ancestor: &TypeTag) -> Option<u32> {
        if self == ancestor {
            return Some(0);
        }
        let mut visited: HashSet<&'static str> = HashSet::new();
        let mut frontier: VecDeque<(&TypeTag, u32)> = VecDeque::new();
        visited.insert(self.name);
        frontier.push_back((self, 0));
        while let Some((current, depth)) = frontier.pop_front() {
            for parent in current.supertypes {
                if *parent == ancestor {
                    return Some(depth + 1);
                }
                if visited.insert(parent.name) {
                    frontier.push_back((*parent, depth + 1));
                }
            }
        }
        None
    }

    /// `self` 是否为 `ancestor` 本身或其子标签。
    pub fn is_a(&self, ancestor: &TypeTag) -> bool {
        self.distance_to(ancestor).is_some()
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeTag").field(&self.name).finish()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 以 `static` 形式声明类型标签。
///
/// ```rust
/// use sos_dispatch::declare_type;
///
/// declare_type!(pub DOCUMENT = "example.Document");
/// declare_type!(pub INSERT = "example.Insert" => [DOCUMENT]);
///
/// assert_eq!(INSERT.distance_to(&DOCUMENT), Some(1));
/// ```
#[macro_export]
macro_rules! declare_type {
    ($vis:vis $ident:ident = $name:literal) => {
        $vis static $ident: $crate::capability::TypeTag = $crate::capability::TypeTag::new($name, &[]);
    };
    ($vis:vis $ident:ident = $name:literal => [$($parent:path),+ $(,)?]) => {
        $vis static $ident: $crate::capability::TypeTag =
            $crate::capability::TypeTag::new($name, &[$(&$parent),+]);
    };
}

/// 核心内置的负载类型标签。
///
/// 写出器注册表以这些标签为根：协议特定的文档类型应把 [`DOCUMENT`] 声明为父标签，
/// 从而在没有专用写出器时回落到通用实现。
pub mod builtin {
    crate::declare_type!(pub PAYLOAD = "core.Payload");
    crate::declare_type!(pub DOCUMENT = "core.Document" => [PAYLOAD]);
    crate::declare_type!(pub ENCODED_DOCUMENT = "core.EncodedDocument" => [DOCUMENT]);
    crate::declare_type!(pub JSON_DOCUMENT = "core.JsonDocument" => [DOCUMENT]);
    crate::declare_type!(pub EXCEPTION_REPORT = "core.ExceptionReport" => [PAYLOAD]);
}
