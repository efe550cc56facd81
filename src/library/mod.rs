//! Function library
//!
//! The closed table of helper functions callable from rule and formula
//! source. Names are case-insensitive. Functions are pure: wrong argument
//! types produce the empty value of the result (0, null, false); only a wrong
//! argument count is an evaluation error.

pub mod dates;
pub mod logic;
pub mod quarter;

pub use dates::REST_DAY;
pub use quarter::Quarter;

use crate::expr::EvalError;
use crate::value::FieldValue;

/// Library revision, recorded on every compiled schema
pub const LIBRARY_VERSION: u32 = 1;

/// Accepted argument count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// `None` for variadic functions
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub const fn between(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }
}

/// One library entry
pub struct LibraryFunction {
    pub name: &'static str,
    pub arity: Arity,
    pub summary: &'static str,
    call: fn(&[FieldValue]) -> FieldValue,
}

impl LibraryFunction {
    /// Call with an argument count check
    pub fn invoke(&self, args: &[FieldValue]) -> Result<FieldValue, EvalError> {
        if !self.arity.accepts(args.len()) {
            let expected = match self.arity.max {
                Some(max) if max == self.arity.min => format!("{}", max),
                Some(max) => format!("{} to {}", self.arity.min, max),
                None => format!("at least {}", self.arity.min),
            };
            return Err(EvalError::Function {
                function: self.name.to_string(),
                message: format!("expected {} argument(s), got {}", expected, args.len()),
            });
        }
        Ok((self.call)(args))
    }
}

impl std::fmt::Debug for LibraryFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

macro_rules! function {
    ($name:literal, $arity:expr, $call:path, $summary:literal) => {
        LibraryFunction {
            name: $name,
            arity: $arity,
            summary: $summary,
            call: $call,
        }
    };
}

static STANDARD: &[LibraryFunction] = &[
    function!("AgeAt", Arity::between(1, 2), dates::call_age_at, "Completed years between a date and an as-of date (default now)"),
    function!("Age", Arity::exactly(1), dates::call_age, "Completed years between a date and now"),
    function!("YearsDiff", Arity::exactly(2), dates::call_years_diff, "Whole years between two dates"),
    function!("MonthsDiff", Arity::exactly(2), dates::call_months_diff, "Whole months between two dates"),
    function!("DaysDiff", Arity::exactly(2), dates::call_days_diff, "Whole days between two dates, time of day ignored"),
    function!("AfterDays", Arity::exactly(2), dates::call_after_days, "Date plus n days, skipping the rest day"),
    function!("AfterQDays", Arity::exactly(3), dates::call_after_q_days, "End of the quarter k quarters away plus n days, skipping the rest day"),
    function!("Recent", Arity::exactly(2), dates::call_recent, "Later of two nullable dates"),
    function!("Former", Arity::exactly(2), dates::call_former, "Earlier of two nullable dates"),
    function!("WhenRecent", Arity::exactly(2), dates::call_when_recent, "First date if the second is missing or earlier, else null"),
    function!("Quarter", Arity::exactly(1), dates::call_quarter, "Zero-based quarter index of a date"),
    function!("QuarterStart", Arity::exactly(1), dates::call_quarter_start, "First day of a quarter, from a date or index"),
    function!("QuarterEnd", Arity::exactly(1), dates::call_quarter_end, "Last day of a quarter, from a date or index"),
    function!("OneOf", Arity::at_least(2), logic::call_one_of, "Exactly one operand true (XOR chain)"),
    function!("OneOf2", Arity::exactly(2), logic::call_one_of, "OneOf over 2 operands"),
    function!("OneOf3", Arity::exactly(3), logic::call_one_of, "OneOf over 3 operands"),
    function!("OneOf4", Arity::exactly(4), logic::call_one_of, "OneOf over 4 operands"),
    function!("OneOf5", Arity::exactly(5), logic::call_one_of, "OneOf over 5 operands"),
    function!("OneOf6", Arity::exactly(6), logic::call_one_of, "OneOf over 6 operands"),
    function!("AtMostOne", Arity::at_least(2), logic::call_at_most_one, "At most one operand true"),
    function!("AtMostOne2", Arity::exactly(2), logic::call_at_most_one, "AtMostOne over 2 operands"),
    function!("AtMostOne3", Arity::exactly(3), logic::call_at_most_one, "AtMostOne over 3 operands"),
    function!("AtMostOne4", Arity::exactly(4), logic::call_at_most_one, "AtMostOne over 4 operands"),
    function!("AtMostOne5", Arity::exactly(5), logic::call_at_most_one, "AtMostOne over 5 operands"),
    function!("AtMostOne6", Arity::exactly(6), logic::call_at_most_one, "AtMostOne over 6 operands"),
    function!("Choose", Arity::at_least(1), logic::call_choose, "First non-null operand"),
    function!("Choose2", Arity::exactly(2), logic::call_choose, "Choose over 2 operands"),
    function!("Choose3", Arity::exactly(3), logic::call_choose, "Choose over 3 operands"),
    function!("Choose4", Arity::exactly(4), logic::call_choose, "Choose over 4 operands"),
    function!("Is", Arity::exactly(1), logic::call_is, "Non-null and not false"),
    function!("False", Arity::exactly(1), logic::call_false, "Explicit boolean false"),
    function!("Num", Arity::exactly(1), logic::call_num, "Decimal value or 0"),
    function!("HasFlags", Arity::exactly(2), logic::call_has_flags, "Non-zero bitwise AND"),
];

/// The function table handed to the expression compiler
#[derive(Debug, Clone, Copy)]
pub struct FunctionLibrary {
    functions: &'static [LibraryFunction],
}

impl Default for FunctionLibrary {
    fn default() -> Self {
        Self::standard()
    }
}

impl FunctionLibrary {
    pub fn standard() -> Self {
        Self { functions: STANDARD }
    }

    pub fn version(&self) -> u32 {
        LIBRARY_VERSION
    }

    pub fn functions(&self) -> &'static [LibraryFunction] {
        self.functions
    }

    /// Case-insensitive lookup
    pub fn lookup(&self, name: &str) -> Option<&'static LibraryFunction> {
        self.functions
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Call a function by name
    pub fn invoke(&self, name: &str, args: &[FieldValue]) -> Result<FieldValue, EvalError> {
        let function = self.lookup(name).ok_or_else(|| EvalError::Function {
            function: name.to_string(),
            message: "no such library function".to_string(),
        })?;
        function.invoke(args)
    }
}
