//! 队列键名常量
//! Queue key name constants
//!
//! 五个命名键：三条优先级通道（列表）、一个在途有序集合、一个延迟有序集合。
//! Five named keys: three priority lanes (lists), one in-flight sorted set, one delayed sorted set.
//! 键名可通过配置覆盖；这里是默认值与派生辅助函数。
//! Key names can be overridden via configuration; defaults and derivation helpers live here.

/// 高优先级通道键
/// High priority lane key
pub const HIGH_LANE: &str = "queue:high";
/// 中优先级通道键
/// Medium priority lane key
pub const MEDIUM_LANE: &str = "queue:medium";
/// 低优先级通道键
/// Low priority lane key
pub const LOW_LANE: &str = "queue:low";
/// 在途有序集合键，score 为租约到期的 unix 秒
/// In-flight sorted set key, scored by lease-expiry unix seconds
pub const PROCESSING_SET: &str = "queue:processing";
/// 延迟有序集合键，score 为可执行时刻的 unix 秒
/// Delayed sorted set key, scored by eligibility unix seconds
pub const DELAYED_SET: &str = "queue:delayed";

/// 在途集合的 task_id → 序列化条目 二级索引键
/// Secondary index key of the in-flight set: task_id → serialized entry
///
/// 使 ack 无需线性扫描有序集合即可定位成员
/// Lets ack locate the member without a linear scan of the sorted set
pub fn processing_index_key(processing_key: &str) -> String {
  format!("{processing_key}:index")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_keys() {
    assert_eq!(HIGH_LANE, "queue:high");
    assert_eq!(MEDIUM_LANE, "queue:medium");
    assert_eq!(LOW_LANE, "queue:low");
    assert_eq!(PROCESSING_SET, "queue:processing");
    assert_eq!(DELAYED_SET, "queue:delayed");
  }

  #[test]
  fn test_processing_index_key() {
    assert_eq!(
      processing_index_key(PROCESSING_SET),
      "queue:processing:index"
    );
    assert_eq!(
      processing_index_key("custom:processing"),
      "custom:processing:index"
    );
  }
}
