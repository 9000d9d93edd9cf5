//! This crate contains utility functions for displaying models, formulas and
//! model checking results in a uniform way.

use std::fmt::Display;

/// Size of a tab when displaying types
pub const TAB_SIZE: usize = 4;

/// Join iterators over string types using the given separator
///
/// The separator can be any string, including an empty string. It will not be
/// appended to the end of the result.
///
/// # Example
///
/// ```
/// use pmc_display_utils::join_iterator;
///
/// let list = vec!["a", "b", "c"];
/// assert_eq!(join_iterator(list.iter(), ", "), "a, b, c");
/// ```
pub fn join_iterator<T: ToString, U: Iterator<Item = T>, S: Into<String>>(
    list: U,
    sep: S,
) -> String {
    list.map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(sep.into().as_str())
}

/// Display the elements of an iterator as a set, i.e., enclosed in braces
///
/// # Example
///
/// ```
/// use pmc_display_utils::display_set;
///
/// assert_eq!(display_set([3, 1, 2].iter()), "{3, 1, 2}");
/// assert_eq!(display_set(Vec::<u32>::new().iter()), "{}");
/// ```
pub fn display_set<T: Display>(set: impl IntoIterator<Item = T>) -> String {
    format!("{{{}}}", join_iterator(set.into_iter(), ", "))
}

/// Display a list of `name : value` pairs with the separators aligned
///
/// # Example
///
/// ```
/// use pmc_display_utils::display_aligned_pairs;
///
/// let pairs = [("a", 1), ("long", 2)];
/// assert_eq!(display_aligned_pairs(pairs.iter()), "a    : 1\nlong : 2");
/// ```
pub fn display_aligned_pairs<'a, K, V>(pairs: impl IntoIterator<Item = &'a (K, V)>) -> String
where
    K: Display + 'a,
    V: Display + 'a,
{
    let pairs = pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<Vec<_>>();
    let width = pairs.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);

    join_iterator(
        pairs.iter().map(|(k, v)| format!("{k:<width$} : {v}")),
        "\n",
    )
}

/// This function can be used to indent all lines of a string by a tab size
///
/// # Example
///
/// ```
/// use pmc_display_utils::indent_all;
///
/// let input = "a\nb\nc";
/// assert_eq!(indent_all(input), "    a\n    b\n    c");
/// ```
pub fn indent_all<S>(input: S) -> String
where
    S: Into<String>,
{
    let tab = " ".repeat(TAB_SIZE);
    let input: String = input.into();
    let input_n_lines = input.lines().count();

    let mut output = String::with_capacity(input.len() + input_n_lines * TAB_SIZE);

    for (i, line) in input.lines().enumerate() {
        if !line.is_empty() {
            output.push_str(&tab);
        }

        output.push_str(line);

        if i != input_n_lines - 1 {
            output.push('\n');
        }
    }

    if input.ends_with('\n') {
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_iterator() {
        let list = ["a", "b", "c"];
        assert_eq!(join_iterator(list.iter(), ", "), "a, b, c");
        assert_eq!(join_iterator(list.iter(), ""), "abc");
    }

    #[test]
    fn test_display_set() {
        assert_eq!(display_set(["x"].iter()), "{x}");
        assert_eq!(display_set([0usize, 4].iter()), "{0, 4}");
    }

    #[test]
    fn test_display_aligned_pairs() {
        let pairs = [("P=?[F s=7]", "0.1666"), ("R", "3.6")];
        assert_eq!(
            display_aligned_pairs(pairs.iter()),
            "P=?[F s=7] : 0.1666\nR          : 3.6"
        );

        let empty: [(String, String); 0] = [];
        assert_eq!(display_aligned_pairs(empty.iter()), "");
    }

    #[test]
    fn test_indent_all() {
        let input = "a\nb\nc";
        assert_eq!(indent_all(input), "    a\n    b\n    c");
    }

    #[test]
    fn test_indent_all_keeps_empty_lines_and_trailing_newline() {
        let input = "a\n\nb\n";
        assert_eq!(indent_all(input), "    a\n\n    b\n");
    }
}
