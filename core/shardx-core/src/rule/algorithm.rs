//! Sharding algorithms — closed set of tagged variants.
//!
//! Algorithms map a sharding value (or range of values) to target names
//! taken from the candidates handed in by the strategy. Index-based
//! algorithms (`MOD`, `HASH_MOD`, `*_RANGE`) select the candidate whose
//! trailing digits equal the computed index, so `t_order_3` is partition 3.

use crate::config::AlgorithmConfiguration;
use crate::error::{ShardxError, ShardxResult};
use crate::rule::inline::InlineExpression;
use crate::value::ScalarValue;
use std::ops::Bound;

/// Inclusive/exclusive range of sharding values (BETWEEN, `>`, `<`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct RangeValue {
    pub lower: Bound<ScalarValue>,
    pub upper: Bound<ScalarValue>,
}

impl RangeValue {
    pub fn new(lower: Bound<ScalarValue>, upper: Bound<ScalarValue>) -> Self {
        Self { lower, upper }
    }

    /// `BETWEEN lower AND upper`
    pub fn closed(lower: impl Into<ScalarValue>, upper: impl Into<ScalarValue>) -> Self {
        Self::new(Bound::Included(lower.into()), Bound::Included(upper.into()))
    }

    /// Integral bounds as an inclusive `[lo, hi]`, `None` for an open side.
    pub fn integral_bounds(&self) -> (Option<i64>, Option<i64>) {
        let lo = match &self.lower {
            Bound::Included(v) => v.as_i64(),
            Bound::Excluded(v) => v.as_i64().and_then(|x| x.checked_add(1)),
            Bound::Unbounded => None,
        };
        let hi = match &self.upper {
            Bound::Included(v) => v.as_i64(),
            Bound::Excluded(v) => v.as_i64().and_then(|x| x.checked_sub(1)),
            Bound::Unbounded => None,
        };
        (lo, hi)
    }

    fn is_integral(&self) -> bool {
        let integral = |bound: &Bound<ScalarValue>| match bound {
            Bound::Included(v) | Bound::Excluded(v) => matches!(v, ScalarValue::Int64(_)),
            Bound::Unbounded => true,
        };
        integral(&self.lower) && integral(&self.upper)
    }

    /// `> i64::MAX` or `< i64::MIN`
    fn overflows_integral(&self) -> bool {
        matches!(self.lower, Bound::Excluded(ScalarValue::Int64(i64::MAX)))
            || matches!(self.upper, Bound::Excluded(ScalarValue::Int64(i64::MIN)))
    }

    /// Intersection of two ranges over the same column.
    pub fn intersect(&self, other: &RangeValue) -> RangeValue {
        fn tighter_lower(a: &Bound<ScalarValue>, b: &Bound<ScalarValue>) -> Bound<ScalarValue> {
            match (a, b) {
                (Bound::Unbounded, x) | (x, Bound::Unbounded) => x.clone(),
                (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
                    match x.compare(y) {
                        std::cmp::Ordering::Greater => a.clone(),
                        std::cmp::Ordering::Less => b.clone(),
                        std::cmp::Ordering::Equal => {
                            if matches!(a, Bound::Excluded(_)) { a.clone() } else { b.clone() }
                        }
                    }
                }
            }
        }
        fn tighter_upper(a: &Bound<ScalarValue>, b: &Bound<ScalarValue>) -> Bound<ScalarValue> {
            match (a, b) {
                (Bound::Unbounded, x) | (x, Bound::Unbounded) => x.clone(),
                (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
                    match x.compare(y) {
                        std::cmp::Ordering::Less => a.clone(),
                        std::cmp::Ordering::Greater => b.clone(),
                        std::cmp::Ordering::Equal => {
                            if matches!(a, Bound::Excluded(_)) { a.clone() } else { b.clone() }
                        }
                    }
                }
            }
        }
        RangeValue::new(
            tighter_lower(&self.lower, &other.lower),
            tighter_upper(&self.upper, &other.upper),
        )
    }

    /// Whether `value` falls inside the range.
    pub fn contains(&self, value: &ScalarValue) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => value.compare(l).is_ge(),
            Bound::Excluded(l) => value.compare(l).is_gt(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => value.compare(u).is_le(),
            Bound::Excluded(u) => value.compare(u).is_lt(),
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Whether no value can satisfy the range.
    pub fn is_empty(&self) -> bool {
        if self.is_integral() {
            // `> 5 AND < 6` leaves no integer even though 5 < 6
            return match self.integral_bounds() {
                (Some(lo), Some(hi)) => lo > hi,
                _ => self.overflows_integral(),
            };
        }
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l.compare(u).is_gt(),
            (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => {
                l.compare(u).is_ge()
            }
            _ => false,
        }
    }
}

/// Pick the candidate whose trailing digit run equals `index`.
pub(crate) fn find_by_suffix<'a>(available: &'a [String], index: i64) -> Option<&'a String> {
    available.iter().find(|name| suffix_index(name) == Some(index))
}

/// Trailing digit run of a target name, `3` for `t_order_3`.
fn suffix_index(name: &str) -> Option<i64> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// Java-compatible `hashCode` so HASH_MOD places rows where the original
/// deployment did.
fn java_hash_code(value: &ScalarValue) -> i32 {
    match value {
        ScalarValue::Int64(v) => (*v ^ ((*v as u64) >> 32) as i64) as i32,
        ScalarValue::Utf8(s) => s
            .encode_utf16()
            .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(i32::from(c))),
        ScalarValue::Boolean(b) => {
            if *b {
                1231
            } else {
                1237
            }
        }
        ScalarValue::Float64(f) => {
            let bits = f.to_bits();
            (bits ^ (bits >> 32)) as i32
        }
        ScalarValue::Null => 0,
    }
}

fn require_prop<'a>(name: &str, config: &'a AlgorithmConfiguration, key: &str) -> ShardxResult<&'a str> {
    config.props.get(key).map(String::as_str).ok_or_else(|| {
        ShardxError::config(format!(
            "algorithm '{name}' ({}) requires property '{key}'",
            config.kind
        ))
    })
}

fn parse_i64_prop(name: &str, key: &str, raw: &str) -> ShardxResult<i64> {
    raw.trim().parse().map_err(|_| {
        ShardxError::config(format!(
            "algorithm '{name}': property '{key}' expects an integer, got '{raw}'"
        ))
    })
}

fn sharding_value_as_i64(value: &ScalarValue) -> ShardxResult<i64> {
    if value.is_null() {
        return Err(ShardxError::RoutingFailed(
            "sharding value cannot be NULL".to_string(),
        ));
    }
    value.as_i64().ok_or_else(|| {
        ShardxError::RoutingFailed(format!("sharding value '{value}' is not an integer"))
    })
}

/// Standard (single-column) sharding algorithm.
#[derive(Debug, Clone, PartialEq)]
pub enum StandardAlgorithm {
    /// `value mod sharding_count`
    Mod { sharding_count: i64 },
    /// `abs(hashCode(value)) mod sharding_count`
    HashMod { sharding_count: i64 },
    /// Partition `i` holds `[b(i-1), b(i))`; partition 0 is everything below `b0`
    BoundaryRange { boundaries: Vec<i64> },
    /// Partition 0 is `< lower`, then one partition per `volume`, last is `>= upper`
    VolumeRange { lower: i64, upper: i64, volume: i64 },
    /// Expression template over the sharding column
    Inline { expression: InlineExpression },
}

impl StandardAlgorithm {
    fn partition_of(boundaries: &[i64], value: i64) -> i64 {
        boundaries.iter().take_while(|b| **b <= value).count() as i64
    }

    /// Highest VOLUME_RANGE partition: one per started volume plus the `>= upper` one.
    fn volume_partitions(lower: i64, upper: i64, volume: i64) -> i64 {
        let span = i128::from(upper) - i128::from(lower);
        let volume = i128::from(volume);
        let partitions = (span + volume - 1) / volume + 1;
        i64::try_from(partitions).unwrap_or(i64::MAX)
    }

    fn volume_partition_of(lower: i64, upper: i64, volume: i64, value: i64) -> i64 {
        if value < lower {
            0
        } else if value >= upper {
            Self::volume_partitions(lower, upper, volume)
        } else {
            let offset = (i128::from(value) - i128::from(lower)) / i128::from(volume);
            i64::try_from(offset + 1).unwrap_or(i64::MAX)
        }
    }

    /// Map one EQ/IN value to a target among `available`.
    pub fn do_sharding(
        &self,
        available: &[String],
        column: &str,
        value: &ScalarValue,
    ) -> ShardxResult<Option<String>> {
        let index = match self {
            StandardAlgorithm::Mod { sharding_count } => {
                sharding_value_as_i64(value)?.rem_euclid(*sharding_count)
            }
            StandardAlgorithm::HashMod { sharding_count } => {
                if value.is_null() {
                    return Err(ShardxError::RoutingFailed(
                        "sharding value cannot be NULL".to_string(),
                    ));
                }
                i64::from(java_hash_code(value)).abs() % sharding_count
            }
            StandardAlgorithm::BoundaryRange { boundaries } => {
                Self::partition_of(boundaries, sharding_value_as_i64(value)?)
            }
            StandardAlgorithm::VolumeRange {
                lower,
                upper,
                volume,
            } => Self::volume_partition_of(*lower, *upper, *volume, sharding_value_as_i64(value)?),
            StandardAlgorithm::Inline { expression } => {
                let target = expression.evaluate(|name| {
                    name.eq_ignore_ascii_case(column).then(|| value.clone())
                })?;
                return Ok(available
                    .iter()
                    .find(|a| a.eq_ignore_ascii_case(&target))
                    .cloned());
            }
        };
        Ok(find_by_suffix(available, index).cloned())
    }

    /// Map a range of values to targets; unnarrowable ranges return every candidate.
    pub fn do_range_sharding(&self, available: &[String], range: &RangeValue) -> Vec<String> {
        let (lo, hi) = range.integral_bounds();
        match self {
            StandardAlgorithm::Mod { sharding_count } => match (lo, hi) {
                (Some(lo), Some(hi))
                    if hi >= lo && hi.checked_sub(lo).is_some_and(|d| d < *sharding_count) =>
                {
                    let mut result: Vec<String> = Vec::new();
                    for v in lo..=hi {
                        if let Some(target) = find_by_suffix(available, v.rem_euclid(*sharding_count))
                            && !result.contains(target)
                        {
                            result.push(target.clone());
                        }
                    }
                    result
                }
                _ => available.to_vec(),
            },
            StandardAlgorithm::BoundaryRange { boundaries } => {
                let max = boundaries.len() as i64;
                let first = lo.map_or(0, |v| Self::partition_of(boundaries, v));
                let last = hi.map_or(max, |v| Self::partition_of(boundaries, v));
                Self::targets_in(available, first, last)
            }
            StandardAlgorithm::VolumeRange {
                lower,
                upper,
                volume,
            } => {
                let max = Self::volume_partitions(*lower, *upper, *volume);
                let first = lo.map_or(0, |v| Self::volume_partition_of(*lower, *upper, *volume, v));
                let last = hi.map_or(max, |v| Self::volume_partition_of(*lower, *upper, *volume, v));
                Self::targets_in(available, first, last)
            }
            StandardAlgorithm::HashMod { .. } | StandardAlgorithm::Inline { .. } => available.to_vec(),
        }
    }

    /// Candidates whose suffix index lies in `first..=last`, in candidate order.
    fn targets_in(available: &[String], first: i64, last: i64) -> Vec<String> {
        available
            .iter()
            .filter(|name| suffix_index(name).is_some_and(|i| (first..=last).contains(&i)))
            .cloned()
            .collect()
    }
}

/// Multi-column sharding algorithm.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplexAlgorithm {
    /// Expression over several columns, evaluated per value combination
    Inline { expression: InlineExpression },
}

impl ComplexAlgorithm {
    pub fn columns(&self) -> Vec<String> {
        match self {
            ComplexAlgorithm::Inline { expression } => expression.columns(),
        }
    }

    /// `values` holds the EQ/IN values per column; returns `None` when a column
    /// the expression needs has no value (caller falls back to all targets).
    pub fn do_sharding(
        &self,
        available: &[String],
        values: &[(String, Vec<ScalarValue>)],
    ) -> ShardxResult<Option<Vec<String>>> {
        let ComplexAlgorithm::Inline { expression } = self;
        let columns = expression.columns();
        let mut axes: Vec<&[ScalarValue]> = Vec::with_capacity(columns.len());
        for column in &columns {
            match values.iter().find(|(c, _)| c.eq_ignore_ascii_case(column)) {
                Some((_, v)) if !v.is_empty() => axes.push(v),
                _ => return Ok(None),
            }
        }
        let mut result: Vec<String> = Vec::new();
        let mut cursor = vec![0usize; axes.len()];
        loop {
            let target = expression.evaluate(|name| {
                columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(name))
                    .map(|i| axes[i][cursor[i]].clone())
            })?;
            if let Some(found) = available.iter().find(|a| a.eq_ignore_ascii_case(&target))
                && !result.contains(found)
            {
                result.push(found.clone());
            }
            // odometer increment over the cartesian product
            let mut axis = axes.len();
            loop {
                if axis == 0 {
                    return Ok(Some(result));
                }
                axis -= 1;
                cursor[axis] += 1;
                if cursor[axis] < axes[axis].len() {
                    break;
                }
                cursor[axis] = 0;
            }
        }
    }
}

/// Hint sharding algorithm: values arrive out-of-band.
#[derive(Debug, Clone, PartialEq)]
pub enum HintAlgorithm {
    /// Expression over the variable `value`
    Inline { expression: InlineExpression },
}

impl HintAlgorithm {
    pub fn do_sharding(
        &self,
        available: &[String],
        values: &[ScalarValue],
    ) -> ShardxResult<Vec<String>> {
        let HintAlgorithm::Inline { expression } = self;
        let mut result: Vec<String> = Vec::new();
        for value in values {
            let target = expression.evaluate(|name| {
                name.eq_ignore_ascii_case("value").then(|| value.clone())
            })?;
            if let Some(found) = available.iter().find(|a| a.eq_ignore_ascii_case(&target))
                && !result.contains(found)
            {
                result.push(found.clone());
            }
        }
        Ok(result)
    }
}

/// Any configured sharding algorithm, before it is bound to a strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingAlgorithm {
    Standard(StandardAlgorithm),
    Complex(ComplexAlgorithm),
    Hint(HintAlgorithm),
}

impl ShardingAlgorithm {
    /// Build from configuration; unknown types fail at load time.
    pub fn from_config(name: &str, config: &AlgorithmConfiguration) -> ShardxResult<Self> {
        let positive = |key: &str| -> ShardxResult<i64> {
            let v = parse_i64_prop(name, key, require_prop(name, config, key)?)?;
            if v <= 0 {
                return Err(ShardxError::config(format!(
                    "algorithm '{name}': property '{key}' must be positive"
                )));
            }
            Ok(v)
        };
        let expression = || -> ShardxResult<InlineExpression> {
            InlineExpression::parse(require_prop(name, config, "algorithm-expression")?)
        };
        match config.kind.to_ascii_uppercase().as_str() {
            "MOD" => Ok(Self::Standard(StandardAlgorithm::Mod {
                sharding_count: positive("sharding-count")?,
            })),
            "HASH_MOD" => Ok(Self::Standard(StandardAlgorithm::HashMod {
                sharding_count: positive("sharding-count")?,
            })),
            "BOUNDARY_RANGE" => {
                let raw = require_prop(name, config, "sharding-ranges")?;
                let boundaries = raw
                    .split(',')
                    .map(|b| parse_i64_prop(name, "sharding-ranges", b))
                    .collect::<ShardxResult<Vec<_>>>()?;
                if boundaries.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(ShardxError::config(format!(
                        "algorithm '{name}': sharding-ranges must be strictly ascending"
                    )));
                }
                Ok(Self::Standard(StandardAlgorithm::BoundaryRange { boundaries }))
            }
            "VOLUME_RANGE" => {
                let lower = parse_i64_prop(name, "range-lower", require_prop(name, config, "range-lower")?)?;
                let upper = parse_i64_prop(name, "range-upper", require_prop(name, config, "range-upper")?)?;
                let volume = positive("sharding-volume")?;
                if lower >= upper {
                    return Err(ShardxError::config(format!(
                        "algorithm '{name}': range-lower must be below range-upper"
                    )));
                }
                Ok(Self::Standard(StandardAlgorithm::VolumeRange {
                    lower,
                    upper,
                    volume,
                }))
            }
            "INLINE" => Ok(Self::Standard(StandardAlgorithm::Inline {
                expression: expression()?,
            })),
            "COMPLEX_INLINE" => Ok(Self::Complex(ComplexAlgorithm::Inline {
                expression: expression()?,
            })),
            "HINT_INLINE" => Ok(Self::Hint(HintAlgorithm::Inline {
                expression: expression()?,
            })),
            _ => Err(ShardxError::UnknownAlgorithm {
                kind: config.kind.clone(),
            }),
        }
    }
}
