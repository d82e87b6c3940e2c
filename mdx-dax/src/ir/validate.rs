//! Read-only structural checks over an already-constructed `Query`
//! (spec.md §4.C): `validate()` and `dependencies()`. Neither method
//! mutates the query; `validate()` is the *only* place cyclic calculation
//! graphs are detected (the IR builder calls it and turns blocking issues
//! into a `BuildError`, per spec.md §4.D step 8).

use std::collections::{HashSet, VecDeque};

use super::query::{Calculation, Expr, Query};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub message: String,
    /// A blocking issue aborts the build (spec.md §4.D step 9); a
    /// non-blocking one becomes a warning attached to `Metadata`.
    pub blocking: bool,
}

impl Issue {
    fn blocking<S: Into<String>>(message: S) -> Self {
        Issue {
            message: message.into(),
            blocking: true,
        }
    }

    fn warning<S: Into<String>>(message: S) -> Self {
        Issue {
            message: message.into(),
            blocking: false,
        }
    }
}

/// Names a query's constructs refer to, grouped by kind — used by the
/// generator to decide which calculations need a `DEFINE MEASURE` block
/// and in which order (spec.md §4.C).
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    pub measures: HashSet<String>,
    pub dimensions: HashSet<(String, String)>,
    pub calculations: HashSet<String>,
}

impl Query {
    pub fn validate(&self) -> Vec<Issue> {
        let mut issues = Vec::new();

        let mut seen_measures = HashSet::new();
        for m in &self.measures {
            if !seen_measures.insert(m.name.clone()) {
                issues.push(Issue::blocking(format!(
                    "duplicate measure name `{}`",
                    m.name
                )));
            }
            if (m.aggregation == super::query::Aggregation::Custom) != m.expression.is_some() {
                issues.push(Issue::blocking(format!(
                    "measure `{}` must carry an expression iff its aggregation is CUSTOM",
                    m.name
                )));
            }
        }

        for dim in &self.dimensions {
            if let super::query::MemberSelection::Specific(members) = &dim.members {
                if members.is_empty() {
                    issues.push(Issue::blocking(format!(
                        "dimension `{}.{}` has a Specific member selection with no members",
                        dim.hierarchy.name, dim.level.name
                    )));
                }
            }
        }

        let calc_names: HashSet<&str> = self.calculations.iter().map(|c| c.name.as_str()).collect();
        for filter in &self.filters {
            if let super::query::Filter::Measure(mf) = filter {
                if !seen_measures.contains(&mf.measure) && !calc_names.contains(mf.measure.as_str())
                {
                    issues.push(Issue::warning(format!(
                        "measure filter references unknown measure `{}`",
                        mf.measure
                    )));
                }
            }
        }

        if let Some(cycle) = self.find_calculation_cycle() {
            issues.push(Issue::blocking(format!(
                "cyclic dependency among calculated members: {}",
                cycle.join(" -> ")
            )));
        }

        if self.dimensions.len() > 8 {
            issues.push(Issue::warning(format!(
                "query groups by {} dimensions, which may be slow to evaluate",
                self.dimensions.len()
            )));
        }

        issues
    }

    /// Names referenced across measures, filters, calculations and
    /// ordering — the generator's ordering oracle for `DEFINE` blocks.
    pub fn dependencies(&self) -> Dependencies {
        let mut deps = Dependencies::default();
        for m in &self.measures {
            deps.measures.insert(m.name.clone());
            if let Some(expr) = &m.expression {
                collect_expr_deps(expr, &mut deps);
            }
        }
        for dim in &self.dimensions {
            deps.dimensions
                .insert((dim.hierarchy.table.clone(), dim.level.name.clone()));
        }
        for calc in &self.calculations {
            deps.calculations.insert(calc.name.clone());
            collect_expr_deps(&calc.expression, &mut deps);
        }
        deps
    }

    /// Topologically sorts `self.calculations` so that each calculation is
    /// emitted after every calculation it references (spec.md §4.C/§9).
    /// Returns `None` if the dependency graph has a cycle.
    pub fn calculations_in_dependency_order(&self) -> Option<Vec<&Calculation>> {
        let by_name: std::collections::HashMap<&str, &Calculation> = self
            .calculations
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();

        let edges: Vec<(&str, Vec<&str>)> = self
            .calculations
            .iter()
            .map(|c| {
                let mut refs = Vec::new();
                collect_calc_refs(&c.expression, &by_name, &mut refs);
                (c.name.as_str(), refs)
            })
            .collect();

        let order = toposort(&edges)?;
        Some(order.into_iter().map(|name| by_name[name]).collect())
    }

    fn find_calculation_cycle(&self) -> Option<Vec<String>> {
        let by_name: std::collections::HashMap<&str, &Calculation> = self
            .calculations
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();

        for calc in &self.calculations {
            let mut visiting = Vec::new();
            let mut on_path = HashSet::new();
            if has_cycle_from(calc.name.as_str(), &by_name, &mut visiting, &mut on_path) {
                return Some(visiting.into_iter().map(str::to_string).collect());
            }
        }
        None
    }
}

fn has_cycle_from<'a>(
    name: &'a str,
    by_name: &std::collections::HashMap<&'a str, &'a Calculation>,
    path: &mut Vec<&'a str>,
    on_path: &mut HashSet<&'a str>,
) -> bool {
    if on_path.contains(name) {
        path.push(name);
        return true;
    }
    let Some(calc) = by_name.get(name) else {
        return false;
    };
    path.push(name);
    on_path.insert(name);
    let mut refs = Vec::new();
    collect_calc_refs(&calc.expression, by_name, &mut refs);
    for r in refs {
        if has_cycle_from(r, by_name, path, on_path) {
            return true;
        }
    }
    on_path.remove(name);
    path.pop();
    false
}

fn collect_calc_refs<'a>(
    expr: &Expr,
    by_name: &std::collections::HashMap<&'a str, &'a Calculation>,
    out: &mut Vec<&'a str>,
) {
    match expr {
        Expr::MeasureRef(name) => {
            if let Some((&key, _)) = by_name.get_key_value(name.as_str()) {
                out.push(key);
            }
        }
        Expr::Constant(_) | Expr::MemberRef(_) => {}
        Expr::Binary(l, _, r) => {
            collect_calc_refs(l, by_name, out);
            collect_calc_refs(r, by_name, out);
        }
        Expr::Unary(_, inner) => collect_calc_refs(inner, by_name, out),
        Expr::FunctionCall(_, _, args) => {
            for a in args {
                collect_calc_refs(a, by_name, out);
            }
        }
        Expr::Iif(c, t, e) => {
            collect_calc_refs(c, by_name, out);
            collect_calc_refs(t, by_name, out);
            collect_calc_refs(e, by_name, out);
        }
        Expr::Case(arms, else_branch) => {
            for (c, v) in arms {
                collect_calc_refs(c, by_name, out);
                collect_calc_refs(v, by_name, out);
            }
            if let Some(e) = else_branch {
                collect_calc_refs(e, by_name, out);
            }
        }
    }
}

fn collect_expr_deps(expr: &Expr, deps: &mut Dependencies) {
    match expr {
        Expr::MeasureRef(name) => {
            deps.measures.insert(name.clone());
        }
        Expr::MemberRef(m) => {
            deps.dimensions
                .insert((m.table.clone(), m.hierarchy.clone()));
        }
        Expr::Constant(_) => {}
        Expr::Binary(l, _, r) => {
            collect_expr_deps(l, deps);
            collect_expr_deps(r, deps);
        }
        Expr::Unary(_, inner) => collect_expr_deps(inner, deps),
        Expr::FunctionCall(_, _, args) => {
            for a in args {
                collect_expr_deps(a, deps);
            }
        }
        Expr::Iif(c, t, e) => {
            collect_expr_deps(c, deps);
            collect_expr_deps(t, deps);
            collect_expr_deps(e, deps);
        }
        Expr::Case(arms, else_branch) => {
            for (c, v) in arms {
                collect_expr_deps(c, deps);
                collect_expr_deps(v, deps);
            }
            if let Some(e) = else_branch {
                collect_expr_deps(e, deps);
            }
        }
    }
}

/// Kahn's-algorithm topological sort over a name-keyed dependency list,
/// grounded on the teacher's `prqlc::utils::toposort`. Returns `None` if the
/// graph has a cycle.
fn toposort<'a>(edges: &'a [(&'a str, Vec<&'a str>)]) -> Option<Vec<&'a str>> {
    let mut indegree: std::collections::HashMap<&str, usize> =
        edges.iter().map(|(n, _)| (*n, 0)).collect();
    // indegree[n] counts how many of n's own dependencies have not yet been
    // emitted; a dependency must be emitted before its dependents.
    let mut dependents: std::collections::HashMap<&str, Vec<&str>> = std::collections::HashMap::new();
    for (n, deps) in edges {
        dependents.entry(n).or_default();
        for d in deps {
            dependents.entry(d).or_default().push(n);
            *indegree.entry(n).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&n, _)| n)
        .collect();
    let mut order = Vec::new();
    while let Some(n) = queue.pop_front() {
        order.push(n);
        if let Some(next) = dependents.get(n) {
            for &m in next {
                let count = indegree.get_mut(m).unwrap();
                *count -= 1;
                if *count == 0 {
                    queue.push_back(m);
                }
            }
        }
    }
    if order.len() != edges.len() {
        None
    } else {
        Some(order)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::query::*;

    fn calc(name: &str, refs: &[&str]) -> Calculation {
        let mut expr = Expr::Constant(Constant::Number(0.0));
        for r in refs {
            expr = Expr::Binary(
                Box::new(expr),
                ExprBinOp::Add,
                Box::new(Expr::MeasureRef(r.to_string())),
            );
        }
        Calculation {
            name: name.to_string(),
            kind: CalculationKind::Measure,
            expression: expr,
            solve_order: None,
            format: None,
        }
    }

    fn base_query(calculations: Vec<Calculation>) -> Query {
        Query {
            cube: CubeRef {
                database: None,
                schema: None,
                name: "Cube".to_string(),
            },
            measures: vec![],
            dimensions: vec![],
            filters: vec![],
            calculations,
            order_by: vec![],
            limit: None,
            metadata: Metadata::default(),
        }
    }

    #[test]
    fn detects_cycle() {
        let q = base_query(vec![calc("A", &["B"]), calc("B", &["A"])]);
        let issues = q.validate();
        assert!(issues.iter().any(|i| i.blocking && i.message.contains("cyclic")));
    }

    #[test]
    fn acyclic_graph_sorts_dependencies_first() {
        let q = base_query(vec![calc("Profit", &["Sales", "Cost"]), calc("Sales", &[])]);
        let order = q.calculations_in_dependency_order().unwrap();
        let names: Vec<&str> = order.iter().map(|c| c.name.as_str()).collect();
        let sales_pos = names.iter().position(|&n| n == "Sales").unwrap();
        let profit_pos = names.iter().position(|&n| n == "Profit").unwrap();
        assert!(sales_pos < profit_pos);
    }

    #[test]
    fn empty_specific_selection_is_blocking() {
        let mut q = base_query(vec![]);
        q.dimensions.push(Dimension {
            hierarchy: HierarchyRef {
                table: "Product".into(),
                name: "Category".into(),
            },
            level: LevelRef {
                name: "Category".into(),
                ordinal: None,
            },
            members: MemberSelection::Specific(vec![]),
            alias: None,
        });
        let issues = q.validate();
        assert!(issues.iter().any(|i| i.blocking));
    }
}
