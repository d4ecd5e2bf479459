use polars::prelude::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Identifier,
    Date,
    Categorical,
    Numeric,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRule {
    /// Strictly greater than zero.
    Positive,
    /// Inside the closed interval [0, 1].
    UnitInterval,
}

impl RangeRule {
    pub fn accepts(&self, value: f64) -> bool {
        match self {
            RangeRule::Positive => value > 0.0,
            RangeRule::UnitInterval => (0.0..=1.0).contains(&value),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            RangeRule::Positive => "must be > 0",
            RangeRule::UnitInterval => "must be within [0, 1]",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub rule: Option<RangeRule>,
}

impl ColumnSpec {
    const fn new(
        name: &'static str,
        kind: ColumnKind,
        nullable: bool,
        rule: Option<RangeRule>,
    ) -> Self {
        Self {
            name,
            kind,
            nullable,
            rule,
        }
    }
}

pub const ORDER_DATE: &str = "OrderDate";
pub const SHIP_MODE: &str = "ShipMode";
pub const QUANTITY: &str = "Quantity";
pub const DISCOUNT: &str = "Discount";
pub const SALES_AMOUNT: &str = "SalesAmount";
pub const PROFIT: &str = "Profit";
pub const FEEDBACK_PROVIDED: &str = "FeedbackProvided";

/// The DMART sales table, in source column order.
pub const SALES_COLUMNS: [ColumnSpec; 13] = {
    use ColumnKind::*;
    [
        ColumnSpec::new("SalesID", Identifier, false, None),
        ColumnSpec::new("OrderID", Identifier, false, None),
        ColumnSpec::new("ProductID", Identifier, false, None),
        ColumnSpec::new("CustomerID", Identifier, false, None),
        ColumnSpec::new("RegionID", Identifier, false, None),
        ColumnSpec::new("LocationID", Identifier, false, None),
        ColumnSpec::new(ORDER_DATE, Date, false, None),
        ColumnSpec::new(SHIP_MODE, Categorical, false, None),
        ColumnSpec::new(QUANTITY, Numeric, false, Some(RangeRule::Positive)),
        ColumnSpec::new(DISCOUNT, Numeric, true, Some(RangeRule::UnitInterval)),
        ColumnSpec::new(SALES_AMOUNT, Numeric, false, Some(RangeRule::Positive)),
        ColumnSpec::new(PROFIT, Numeric, true, None),
        ColumnSpec::new(FEEDBACK_PROVIDED, Boolean, false, None),
    ]
};

/// Numeric measures summarized by the analysis stage.
pub const NUMERIC_COLUMNS: [&str; 4] = [QUANTITY, DISCOUNT, SALES_AMOUNT, PROFIT];

pub fn expected_column_names() -> impl Iterator<Item = &'static str> {
    SALES_COLUMNS.iter().map(|spec| spec.name)
}

/// Columns the cleaning stage turns into a categorical domain.
pub fn is_categorical_column(name: &str) -> bool {
    name.contains("ID") || name == SHIP_MODE
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}
