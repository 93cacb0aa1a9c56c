//! Data
//!
//! A minimal in-memory attribute set and tuple table. Growing, pruning and
//! executing trees only needs typed, per-tuple value access and a tuple weight;
//! reading tables from text and type coercion are left to the caller.
use crate::errors::DTreeError;
use crate::utils::validate_float_parameter;
use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::sync::Arc;

/// Semantic type of an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeKind {
    /// Nominal attribute with an ordered list of value names.
    Nominal(Vec<String>),
    /// Integer valued attribute.
    Integer,
    /// Real valued attribute.
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn nominal<S: Into<String>>(name: S, values: &[&str]) -> Self {
        Attribute {
            name: name.into(),
            kind: AttributeKind::Nominal(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    pub fn integer<S: Into<String>>(name: S) -> Self {
        Attribute {
            name: name.into(),
            kind: AttributeKind::Integer,
        }
    }

    pub fn continuous<S: Into<String>>(name: S) -> Self {
        Attribute {
            name: name.into(),
            kind: AttributeKind::Continuous,
        }
    }

    pub fn is_nominal(&self) -> bool {
        matches!(self.kind, AttributeKind::Nominal(_))
    }

    /// Integer and continuous attributes are both split by a cut value.
    pub fn is_metric(&self) -> bool {
        !self.is_nominal()
    }

    /// Number of values of a nominal attribute, zero otherwise.
    pub fn value_count(&self) -> usize {
        match &self.kind {
            AttributeKind::Nominal(values) => values.len(),
            _ => 0,
        }
    }

    pub fn value_name(&self, code: usize) -> Option<&str> {
        match &self.kind {
            AttributeKind::Nominal(values) => values.get(code).map(|s| s.as_str()),
            _ => None,
        }
    }

    pub fn value_code(&self, name: &str) -> Option<usize> {
        match &self.kind {
            AttributeKind::Nominal(values) => values.iter().position(|v| v == name),
            _ => None,
        }
    }

    /// Check whether a value can be stored in a column of this attribute.
    pub fn accepts(&self, value: &Value) -> bool {
        match (value, &self.kind) {
            (Value::Missing, _) => true,
            (Value::Nominal(c), AttributeKind::Nominal(values)) => *c < values.len(),
            (Value::Integer(_), AttributeKind::Integer) => true,
            (Value::Integer(_), AttributeKind::Continuous) => true,
            (Value::Real(_), AttributeKind::Continuous) => true,
            _ => false,
        }
    }
}

/// Ordered set of attributes with a name index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeSet {
    attributes: Vec<Attribute>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl PartialEq for AttributeSet {
    fn eq(&self, other: &Self) -> bool {
        self.attributes == other.attributes
    }
}

impl AttributeSet {
    pub fn new() -> Self {
        AttributeSet {
            attributes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build an attribute set, rejecting duplicate names.
    pub fn from_attributes(attributes: Vec<Attribute>) -> Result<Self, DTreeError> {
        let mut set = AttributeSet::new();
        for att in attributes {
            set.add(att)?;
        }
        Ok(set)
    }

    /// Append an attribute, returning its identifier.
    pub fn add(&mut self, attribute: Attribute) -> Result<usize, DTreeError> {
        if self.index.contains_key(&attribute.name) {
            return Err(DTreeError::InvalidParameter(
                "attribute".to_string(),
                "a unique attribute name".to_string(),
                attribute.name,
            ));
        }
        let id = self.attributes.len();
        self.index.insert(attribute.name.clone(), id);
        self.attributes.push(attribute);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Attribute> {
        self.attributes.get(id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attributes.iter()
    }

    /// Identifier of an attribute by name. The name index is rebuilt lazily
    /// for deserialized sets, so this falls back to a scan.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        match self.index.get(name) {
            Some(i) => Some(*i),
            None => self.attributes.iter().position(|a| a.name == name),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<usize, DTreeError> {
        self.index_of(name)
            .ok_or_else(|| DTreeError::UnknownAttribute(name.to_string()))
    }

    /// Restore the name index after deserialization.
    pub fn reindex(&mut self) {
        self.index = self
            .attributes
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();
    }
}

/// A single cell of a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Missing,
    Nominal(usize),
    Integer(i64),
    Real(f64),
}

impl Value {
    /// A value is missing if it is explicitly `Missing` or a NaN real.
    #[inline]
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Real(v) => v.is_nan(),
            _ => false,
        }
    }

    #[inline]
    pub fn as_nominal(&self) -> Option<usize> {
        match self {
            Value::Nominal(c) => Some(*c),
            _ => None,
        }
    }

    /// Numeric view of integer and real values.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "?"),
            Value::Nominal(c) => write!(f, "#{}", c),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
        }
    }
}

/// Weighted tuples over an attribute set, stored row-wise.
#[derive(Debug, Clone)]
pub struct Table {
    attributes: Arc<AttributeSet>,
    rows: Vec<Vec<Value>>,
    weights: Vec<f64>,
}

impl Table {
    pub fn new(attributes: Arc<AttributeSet>) -> Self {
        Table {
            attributes,
            rows: Vec::new(),
            weights: Vec::new(),
        }
    }

    pub fn attributes(&self) -> &Arc<AttributeSet> {
        &self.attributes
    }

    /// Number of tuples.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a tuple with weight 1.
    pub fn push(&mut self, values: Vec<Value>) -> Result<(), DTreeError> {
        self.push_weighted(values, 1.0)
    }

    /// Append a tuple, checking every value against its attribute.
    pub fn push_weighted(&mut self, values: Vec<Value>, weight: f64) -> Result<(), DTreeError> {
        if values.len() != self.attributes.len() {
            return Err(DTreeError::InvalidParameter(
                "tuple".to_string(),
                format!("{} values", self.attributes.len()),
                values.len().to_string(),
            ));
        }
        if weight.is_nan() || weight < 0.0 {
            return Err(DTreeError::InvalidParameter(
                "weight".to_string(),
                "a non-negative weight".to_string(),
                weight.to_string(),
            ));
        }
        for (att, value) in self.attributes.iter().zip(values.iter()) {
            if !att.accepts(value) {
                return Err(DTreeError::InvalidValue {
                    attribute: att.name.clone(),
                    value: value.to_string(),
                });
            }
        }
        self.rows.push(values);
        self.weights.push(weight);
        Ok(())
    }

    /// Value of column `col` in tuple `row`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> &Value {
        &self.rows[row][col]
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[Value] {
        &self.rows[row]
    }

    #[inline]
    pub fn weight(&self, row: usize) -> f64 {
        self.weights[row]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// A new table with the given tuples, sharing the attribute set.
    pub fn select(&self, rows: &[usize]) -> Table {
        Table {
            attributes: Arc::clone(&self.attributes),
            rows: rows.iter().map(|r| self.rows[*r].clone()).collect(),
            weights: rows.iter().map(|r| self.weights[*r]).collect(),
        }
    }

    /// Split the tuples at random into a growing and a hold-out table. Each
    /// tuple goes to the first table with probability `frac`.
    pub fn split(&self, frac: f64, rng: &mut StdRng) -> Result<(Table, Table), DTreeError> {
        validate_float_parameter(frac, 0.0, 1.0, "frac")?;
        let (chosen, excluded): (Vec<usize>, Vec<usize>) = (0..self.len()).partition(|_| rng.gen::<f64>() < frac);
        Ok((self.select(&chosen), self.select(&excluded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn attset() -> Arc<AttributeSet> {
        Arc::new(
            AttributeSet::from_attributes(vec![
                Attribute::nominal("outlook", &["sunny", "overcast", "rain"]),
                Attribute::continuous("temp"),
                Attribute::integer("count"),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_attribute_set() {
        let set = attset();
        assert_eq!(3, set.len());
        assert_eq!(Some(1), set.index_of("temp"));
        assert!(set.lookup("wind").is_err());
        assert_eq!(Some(2), set.get(0).unwrap().value_code("rain"));
        assert_eq!(3, set.get(0).unwrap().value_count());
        assert!(set.get(2).unwrap().is_metric());

        let mut dup = (*set).clone();
        assert!(dup.add(Attribute::continuous("temp")).is_err());
    }

    #[test]
    fn test_attribute_set_reindex() {
        let set = attset();
        let json = serde_json::to_string(&*set).unwrap();
        let mut back: AttributeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(Some(2), back.index_of("count"));
        back.reindex();
        assert_eq!(Some(0), back.index_of("outlook"));
        assert_eq!(*set, back);
    }

    #[test]
    fn test_missing_values() {
        assert!(Value::Missing.is_missing());
        assert!(Value::Real(f64::NAN).is_missing());
        assert!(!Value::Real(1.0).is_missing());
        assert_eq!(None, Value::Real(f64::NAN).as_f64());
        assert_eq!(Some(3.0), Value::Integer(3).as_f64());
        assert_eq!(None, Value::Integer(3).as_nominal());
    }

    #[test]
    fn test_table_push() {
        let mut table = Table::new(attset());
        table
            .push(vec![Value::Nominal(0), Value::Real(20.5), Value::Integer(3)])
            .unwrap();
        table
            .push_weighted(vec![Value::Missing, Value::Missing, Value::Integer(1)], 2.0)
            .unwrap();
        assert_eq!(2, table.len());
        assert_eq!(3.0, table.total_weight());
        assert!(table.push(vec![Value::Nominal(5), Value::Missing, Value::Missing]).is_err());
        assert!(table.push(vec![Value::Real(1.0), Value::Missing, Value::Missing]).is_err());
        assert!(table.push(vec![Value::Missing]).is_err());

        let sub = table.select(&[1]);
        assert_eq!(1, sub.len());
        assert_eq!(2.0, sub.weight(0));
        assert!(sub.get(0, 0).is_missing());
    }

    #[test]
    fn test_table_split() {
        let table = fixtures::synthetic(0, 200, 0.0);
        let mut rng = StdRng::seed_from_u64(7);
        let (grow, hold) = table.split(0.7, &mut rng).unwrap();
        assert_eq!(table.len(), grow.len() + hold.len());
        assert!(grow.len() > hold.len());
        assert!((grow.total_weight() + hold.total_weight() - table.total_weight()).abs() < 1e-9);

        let (all, none) = table.split(1.0, &mut rng).unwrap();
        assert_eq!(table.len(), all.len());
        assert!(none.is_empty());
        let (none, all) = table.split(0.0, &mut rng).unwrap();
        assert!(none.is_empty());
        assert_eq!(table.len(), all.len());

        assert!(table.split(1.5, &mut rng).is_err());
        assert!(table.split(f64::NAN, &mut rng).is_err());
    }
}
