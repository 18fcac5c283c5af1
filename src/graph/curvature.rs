//! 平行边曲率分配
//!
//! 同一无序节点对之间的 N 条边按输入顺序编号 i ∈ [0, N)，偏移 k = i − (N−1)/2 关于 0 对称。
//! k = 0 的边画直线；其余边的曲率为
//!
//! ```text
//! curvature(k, N) = sign(k) · A · (1 − e^(−(N−1)/A)) · |k| / ((N−1)/2) · unit
//! ```
//!
//! 幅度随 N 增长但在 A·unit 处饱和，组内随 |k| 单调递增。

use crate::core::error::GraphBuildError;
use crate::graph::types::{CurveType, GraphStyle};

/// 一条边在平行边组内的位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSlot {
    pub curve_type: CurveType,
    pub curvature: f64,
}

/// 第 index 条（共 group_size 条）平行边的对称偏移
pub fn symmetric_offset(index: usize, group_size: usize) -> f64 {
    index as f64 - (group_size as f64 - 1.0) / 2.0
}

/// 按偏移与组内最大偏移计算曲率
///
/// `max_index` 是组内最大的 |k|，即 (N−1)/2。k 非零而 max_index ≤ 0 说明分组被错误构造。
pub fn curvature(offset: f64, max_index: f64, style: &GraphStyle) -> Result<f64, GraphBuildError> {
    if offset == 0.0 {
        return Ok(0.0);
    }
    if max_index <= 0.0 {
        return Err(GraphBuildError::NonPositiveMaxIndex { offset, max_index });
    }
    if !style.has_valid_curvature() {
        return Err(GraphBuildError::InvalidStyle {
            amplitude: style.curvature_amplitude,
            unit: style.curvature_unit,
        });
    }

    let amplitude = style.curvature_amplitude;
    // (N−1) = 2 · max_index
    let saturation = amplitude * (1.0 - (-(2.0 * max_index) / amplitude).exp());
    Ok(offset.signum() * saturation * offset.abs() / max_index * style.curvature_unit)
}

/// 为大小为 group_size 的平行边组生成曲率阶梯（下标与组内顺序一一对应）
pub fn assign_group(group_size: usize, style: &GraphStyle) -> Result<Vec<EdgeSlot>, GraphBuildError> {
    let max_index = (group_size as f64 - 1.0) / 2.0;
    (0..group_size)
        .map(|i| {
            let k = symmetric_offset(i, group_size);
            if k == 0.0 {
                Ok(EdgeSlot {
                    curve_type: CurveType::Straight,
                    curvature: 0.0,
                })
            } else {
                curvature(k, max_index, style).map(|c| EdgeSlot {
                    curve_type: CurveType::Curved,
                    curvature: c,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_symmetric() {
        let three: Vec<f64> = (0..3).map(|i| symmetric_offset(i, 3)).collect();
        assert_eq!(three, vec![-1.0, 0.0, 1.0]);
        let four: Vec<f64> = (0..4).map(|i| symmetric_offset(i, 4)).collect();
        assert_eq!(four, vec![-1.5, -0.5, 0.5, 1.5]);
    }

    #[test]
    fn test_single_edge_is_straight() {
        let slots = assign_group(1, &GraphStyle::default()).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].curve_type, CurveType::Straight);
        assert_eq!(slots[0].curvature, 0.0);
    }

    #[test]
    fn test_two_edges_mirror_each_other() {
        let slots = assign_group(2, &GraphStyle::default()).unwrap();
        assert!(slots.iter().all(|s| s.curve_type == CurveType::Curved));
        assert!(slots[0].curvature < 0.0);
        assert!((slots[0].curvature + slots[1].curvature).abs() < 1e-12);
    }

    #[test]
    fn test_ladder_shape_for_many_edges() {
        let style = GraphStyle::default();
        let bound = style.max_curvature();

        for n in 1..=50 {
            let slots = assign_group(n, &style).unwrap();
            assert_eq!(slots.len(), n);

            for i in 0..n {
                // 关于 0 对称
                let mirrored = slots[n - 1 - i].curvature;
                assert!((slots[i].curvature + mirrored).abs() < 1e-12, "n={} i={}", n, i);
                // 有界
                assert!(slots[i].curvature.abs() < bound, "n={} i={}", n, i);
            }

            // 随 |k| 严格递增：按下标也就是严格递增
            for pair in slots.windows(2) {
                assert!(pair[1].curvature > pair[0].curvature, "n={}", n);
            }

            let straight = slots.iter().filter(|s| s.curve_type == CurveType::Straight).count();
            assert_eq!(straight, n % 2, "n={}", n);
        }
    }

    #[test]
    fn test_outer_edge_grows_with_group_size() {
        let style = GraphStyle::default();
        let outer = |n: usize| assign_group(n, &style).unwrap().last().unwrap().curvature;
        for n in 2..50 {
            assert!(outer(n + 1) >= outer(n), "n={}", n);
        }
    }

    #[test]
    fn test_non_positive_max_index_fails() {
        let style = GraphStyle::default();
        assert!(matches!(
            curvature(1.0, 0.0, &style),
            Err(GraphBuildError::NonPositiveMaxIndex { .. })
        ));
        assert_eq!(curvature(0.0, 0.0, &style).unwrap(), 0.0);
    }

    #[test]
    fn test_non_positive_style_is_rejected() {
        let flat = GraphStyle {
            curvature_amplitude: 0.0,
            ..GraphStyle::default()
        };
        assert!(matches!(
            assign_group(3, &flat),
            Err(GraphBuildError::InvalidStyle { .. })
        ));

        let flipped = GraphStyle {
            curvature_unit: -0.1,
            ..GraphStyle::default()
        };
        assert!(matches!(
            curvature(1.0, 1.0, &flipped),
            Err(GraphBuildError::InvalidStyle { .. })
        ));
        // 单条边不需要曲率，样式无关
        assert_eq!(assign_group(1, &flat).unwrap()[0].curvature, 0.0);
    }
}
