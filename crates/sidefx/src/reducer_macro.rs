//! Macros for building reducer maps.

/// Build a [`ReducerMap`](crate::ReducerMap) with literal syntax.
///
/// Values can be anything convertible into a [`ReducerTree`](crate::ReducerTree):
/// a reducer, a nested map or a `Vec` of trees.
///
/// # Example
///
/// ```ignore
/// use sidefx::{combine_reducers, reducer_map};
///
/// let root = combine_reducers(vec![reducer_map! {
///     "todos" => todos,
///     "timer" => reducer_map! {
///         "elapsed" => elapsed,
///         "running" => running,
///     },
/// }
/// .into()]);
/// ```
#[macro_export]
macro_rules! reducer_map {
    () => {
        $crate::ReducerMap::new()
    };
    ($($key:expr => $tree:expr),+ $(,)?) => {{
        let mut map = $crate::ReducerMap::new();
        $(
            map.insert($key, $tree);
        )+
        map
    }};
}
