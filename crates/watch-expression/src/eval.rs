//! Set-algebra evaluation of compiled expressions

use crate::ast::{Calc, CompareOp, Comparison, Factor, SetOp};
use crate::parser::ParsedExpression;
use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

type ValueSet<'v> = BTreeSet<&'v str>;

impl ParsedExpression {
    /// Evaluate against sampled values keyed by variable name
    ///
    /// Each sequence is treated as a set: order is ignored and duplicates
    /// collapse. A variable missing from `variables` is the empty set.
    pub fn evaluate<K, V>(&self, variables: &HashMap<K, Vec<V>>) -> bool
    where
        K: Borrow<str> + Hash + Eq,
        V: AsRef<str>,
    {
        evaluate_comparison(self.tree(), variables)
    }
}

fn evaluate_comparison<K, V>(tree: &Comparison, variables: &HashMap<K, Vec<V>>) -> bool
where
    K: Borrow<str> + Hash + Eq,
    V: AsRef<str>,
{
    let lhs = evaluate_calc(&tree.lhs, variables);
    let rhs = evaluate_calc(&tree.rhs, variables);

    match tree.op {
        CompareOp::Equal => lhs == rhs,
        CompareOp::NotEqual => lhs != rhs,
        CompareOp::Subset => lhs.is_subset(&rhs),
        CompareOp::Superset => lhs.is_superset(&rhs),
        CompareOp::ProperSubset => lhs.len() < rhs.len() && lhs.is_subset(&rhs),
        CompareOp::ProperSuperset => lhs.len() > rhs.len() && lhs.is_superset(&rhs),
    }
}

fn evaluate_calc<'v, K, V>(calc: &Calc, variables: &'v HashMap<K, Vec<V>>) -> ValueSet<'v>
where
    K: Borrow<str> + Hash + Eq,
    V: AsRef<str>,
{
    let mut acc = evaluate_factor(&calc.head, variables);
    for (op, factor) in &calc.tail {
        let rhs = evaluate_factor(factor, variables);
        acc = match op {
            SetOp::Intersection => acc.intersection(&rhs).copied().collect(),
            SetOp::Union => acc.union(&rhs).copied().collect(),
            SetOp::Difference => acc.difference(&rhs).copied().collect(),
            SetOp::SymmetricDifference => acc.symmetric_difference(&rhs).copied().collect(),
        };
    }
    acc
}

fn evaluate_factor<'v, K, V>(factor: &Factor, variables: &'v HashMap<K, Vec<V>>) -> ValueSet<'v>
where
    K: Borrow<str> + Hash + Eq,
    V: AsRef<str>,
{
    match factor {
        Factor::Empty => BTreeSet::new(),
        Factor::Variable(name) => variables
            .get(name.as_str())
            .map(|values| values.iter().map(|value| value.as_ref()).collect())
            .unwrap_or_default(),
        Factor::Group(inner) => evaluate_calc(inner, variables),
    }
}

#[cfg(test)]
mod tests {
    use crate::compile;
    use std::collections::HashMap;

    fn eval(text: &str, vars: &[(&str, &[&str])]) -> bool {
        let variables: HashMap<&str, Vec<&str>> =
            vars.iter().map(|(k, v)| (*k, v.to_vec())).collect();
        compile(text).unwrap().evaluate(&variables)
    }

    #[test]
    fn test_equality_ignores_order_and_duplicates() {
        assert!(eval("a == b", &[("a", &["1", "2"]), ("b", &["2", "1"])]));
        assert!(eval("a == b", &[("a", &["1", "1", "2"]), ("b", &["2", "1"])]));
        assert!(!eval("a != b", &[("a", &["1", "2"]), ("b", &["2", "1"])]));
    }

    #[test]
    fn test_difference_to_empty() {
        assert!(eval(
            "a - b == empty",
            &[("a", &["1", "2"]), ("b", &["1", "2", "3"])]
        ));
        assert!(!eval(
            "b - a == empty",
            &[("a", &["1", "2"]), ("b", &["1", "2", "3"])]
        ));
    }

    #[test]
    fn test_missing_variable_is_empty() {
        assert!(eval("missing == empty", &[]));
        assert!(eval("a | missing == a", &[("a", &["x"])]));
    }

    #[test]
    fn test_subset_relations() {
        let vars: &[(&str, &[&str])] = &[("a", &["1"]), ("b", &["1", "2"])];
        assert!(eval("a <= b", vars));
        assert!(eval("a < b", vars));
        assert!(eval("b >= a", vars));
        assert!(eval("b > a", vars));
        assert!(eval("a <= a", vars));
        assert!(!eval("a < a", vars));
        assert!(!eval("b > b", vars));
        assert!(!eval("b <= a", vars));
    }

    #[test]
    fn test_operators_left_to_right() {
        let vars: &[(&str, &[&str])] = &[
            ("a", &["1", "2"]),
            ("b", &["2", "3"]),
            ("c", &["1"]),
        ];
        // (a | b) - c = {2, 3}
        assert!(eval("a | b - c == b", vars));
        // a | (b - c) = {1, 2, 3}
        assert!(eval("a | (b - c) == a | b", vars));
        // a ^ b = {1, 3}
        assert!(eval("a ^ b == c | (b - a)", vars));
        assert!(eval("a & b != empty", vars));
    }

    #[test]
    fn test_evaluate_is_pure() {
        let expr = compile("a & b != empty").unwrap();
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), vec!["1".to_string()]);
        vars.insert("b".to_string(), vec!["1".to_string()]);
        let snapshot = vars.clone();
        assert_eq!(expr.evaluate(&vars), expr.evaluate(&vars));
        assert_eq!(vars, snapshot);
    }
}
