// ABOUTME: Iterative rewrite rule for two-term linear recurrences f(p) = c1*f(p-1) + c2*f(p-2)
// ABOUTME: Renders the Python loop body and evaluates the same loop for reference values

/// Rewrite rule for a doubling recurrence.
///
/// The rendered function returns `seeds.0` / `seeds.1` for the first two
/// inputs and otherwise advances the pair `(f(k-2), f(k-1))` once per step.
/// The detector only proves the call shape, not the base cases or the
/// combining step: [`DoublingRecurrence::ADDITIVE`] assumes bases 0 and 1 and
/// an additive step, which is what the Fibonacci-shaped functions it targets
/// compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoublingRecurrence {
    pub seeds: (i64, i64),
    /// Weights of `f(p-1)` and `f(p-2)` respectively.
    pub coefficients: (i64, i64),
}

impl DoublingRecurrence {
    pub const ADDITIVE: Self = Self {
        seeds: (0, 1),
        coefficients: (1, 1),
    };

    /// Python statements for the body of a function taking `param`, each
    /// line prefixed with `indent` (one level of the original body).
    pub fn render_body(&self, param: &str, indent: &str) -> String {
        let (prev, curr) = accumulator_names(param);
        let (s0, s1) = self.seeds;
        let mut out = String::new();

        if self.seeds == (0, 1) {
            out.push_str(&format!("{indent}if {param} <= 1:\n"));
            out.push_str(&format!("{indent}{indent}return {param}\n"));
        } else {
            out.push_str(&format!("{indent}if {param} <= 0:\n"));
            out.push_str(&format!("{indent}{indent}return {s0}\n"));
            out.push_str(&format!("{indent}if {param} == 1:\n"));
            out.push_str(&format!("{indent}{indent}return {s1}\n"));
        }

        out.push_str(&format!("{indent}{prev}, {curr} = {s0}, {s1}\n"));
        out.push_str(&format!("{indent}for _ in range(2, {param} + 1):\n"));
        out.push_str(&format!(
            "{indent}{indent}{prev}, {curr} = {curr}, {}\n",
            self.step_expression(prev, curr)
        ));
        out.push_str(&format!("{indent}return {curr}\n"));
        out
    }

    fn step_expression(&self, prev: &str, curr: &str) -> String {
        let (c1, c2) = self.coefficients;
        let mut terms: Vec<(i64, &str)> = Vec::new();
        if c2 != 0 {
            terms.push((c2, prev));
        }
        if c1 != 0 {
            terms.push((c1, curr));
        }
        if terms.is_empty() {
            return "0".to_string();
        }

        let mut expr = String::new();
        for (idx, (coefficient, name)) in terms.into_iter().enumerate() {
            let magnitude = coefficient.unsigned_abs();
            let term = if magnitude == 1 {
                name.to_string()
            } else {
                format!("{} * {}", magnitude, name)
            };
            match (idx, coefficient < 0) {
                (0, false) => expr.push_str(&term),
                (0, true) => expr.push_str(&format!("-{}", term)),
                (_, false) => expr.push_str(&format!(" + {}", term)),
                (_, true) => expr.push_str(&format!(" - {}", term)),
            }
        }
        expr
    }

    /// Value the rendered Python returns for `n`, or `None` on overflow.
    pub fn evaluate(&self, n: i64) -> Option<i128> {
        let (s0, s1) = (self.seeds.0 as i128, self.seeds.1 as i128);
        if self.seeds == (0, 1) {
            if n <= 1 {
                return Some(n as i128);
            }
        } else if n <= 0 {
            return Some(s0);
        } else if n == 1 {
            return Some(s1);
        }

        let (c1, c2) = (self.coefficients.0 as i128, self.coefficients.1 as i128);
        let (mut prev, mut curr) = (s0, s1);
        for _ in 2..=n {
            let next = c2.checked_mul(prev)?.checked_add(c1.checked_mul(curr)?)?;
            prev = curr;
            curr = next;
        }
        Some(curr)
    }
}

/// Loop accumulators that cannot shadow the parameter.
fn accumulator_names(param: &str) -> (&'static str, &'static str) {
    if param == "a" || param == "b" {
        ("prev_value", "curr_value")
    } else {
        ("a", "b")
    }
}
