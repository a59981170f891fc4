//! Row comparison for ORDER BY / GROUP BY merges.

use crate::sql::context::OrderByColumn;
use crate::sql::statement::OrderDirection;
use crate::value::ScalarValue;
use std::cmp::Ordering;

static NULL_VALUE: ScalarValue = ScalarValue::Null;

/// Output order of two values: `Less` means `left` is emitted first.
///
/// `nulls_first` is already resolved against the direction and dialect, so
/// NULL placement is not flipped by `DESC`.
pub fn compare_values(
    left: &ScalarValue,
    right: &ScalarValue,
    direction: OrderDirection,
    nulls_first: bool,
) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => match direction {
            OrderDirection::Asc => left.compare(right),
            OrderDirection::Desc => left.compare(right).reverse(),
        },
    }
}

fn column(row: &[ScalarValue], index: usize) -> &ScalarValue {
    row.get(index).unwrap_or(&NULL_VALUE)
}

/// Lexicographic comparison over `columns`; short rows read as NULL.
pub fn compare_rows(left: &[ScalarValue], right: &[ScalarValue], columns: &[OrderByColumn]) -> Ordering {
    for c in columns {
        let ordering = compare_values(
            column(left, c.index),
            column(right, c.index),
            c.direction,
            c.nulls_first,
        );
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Whether two rows fall into the same group.
pub fn same_group(left: &[ScalarValue], right: &[ScalarValue], columns: &[OrderByColumn]) -> bool {
    columns
        .iter()
        .all(|c| column(left, c.index).compare(column(right, c.index)) == Ordering::Equal)
}

/// Hashable group key over `columns`.
pub fn group_key(row: &[ScalarValue], columns: &[OrderByColumn]) -> Vec<u8> {
    let mut key = Vec::with_capacity(columns.len() * 9);
    for c in columns {
        column(row, c.index).append_to_key(&mut key);
    }
    key
}
