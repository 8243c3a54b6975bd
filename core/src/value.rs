//! The runtime value model: one tagged enum with per-variant operations,
//! matching the shape of the object package this language's compiler and
//! VM were modelled on (`Number`/`Boolean`/`String`/`Nil`/`List`/`Tuple`/
//! `Map`/`Function`/`Builtin`/`Model`), plus an `Iterator` variant used by
//! `for` loops. Dispatch is a plain `match` on the variant rather than a
//! trait object per value — there's a fixed, closed set of kinds, so a
//! vtable buys nothing but indirection.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::bytecode::CompiledCode;
use crate::errors::VmError;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Map(Rc<RefCell<MapData>>),
    Function(Rc<Function>),
    Builtin(Rc<Builtin>),
    Model(Rc<Model>),
    Iterator(Rc<RefCell<IteratorState>>),
}

#[derive(Debug)]
pub struct Function {
    pub params: Vec<String>,
    pub code: Rc<CompiledCode>,
    /// `Some(map)` when this is a bound method, produced by subscripting a
    /// `Map` for a name its `Model` defines but the map's own entries don't.
    pub receiver: Option<Value>,
}

pub type BuiltinFn = fn(&[Value]) -> Result<Value, VmError>;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    /// `None` for a variadic builtin; `Some(n)` to fail fast with an
    /// `Argument` error before the implementation even runs.
    pub arity: Option<usize>,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

/// A user-defined type: a fixed field list plus a table of methods
/// attached after the fact by assigning a function to `Model.name`.
#[derive(Debug, Default)]
pub struct Model {
    pub params: Vec<String>,
    methods: RefCell<Vec<(String, Rc<Function>)>>,
}

impl Model {
    pub fn new(params: Vec<String>) -> Self {
        Model {
            params,
            methods: RefCell::new(Vec::new()),
        }
    }

    pub fn get_method(&self, name: &str) -> Option<Rc<Function>> {
        self.methods
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f.clone())
    }

    pub fn set_method(&self, name: String, func: Rc<Function>) {
        let mut methods = self.methods.borrow_mut();
        if let Some(slot) = methods.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = func;
        } else {
            methods.push((name, func));
        }
    }

    /// `v := model(x, y); p := v(2, 5)`: calling a model instantiates a
    /// record, a plain `Map` carrying a back-reference to this model for
    /// method lookup.
    pub fn instantiate(self: &Rc<Self>, args: Vec<Value>) -> Result<Value, VmError> {
        if args.len() != self.params.len() {
            return Err(VmError::argument_error(format!(
                "model expects {} argument(s), got {}",
                self.params.len(),
                args.len()
            )));
        }
        let mut data = MapData::new(Some(self.clone()));
        for (name, value) in self.params.iter().zip(args) {
            data.set(Value::string(name.clone()), value)?;
        }
        Ok(Value::Map(Rc::new(RefCell::new(data))))
    }
}

/// A map's backing store: insertion-ordered key/value pairs, each indexed
/// by the canonical structural hash of its key (see [`hash_key`]).
/// Insertion order is kept (rather than a `HashMap`'s arbitrary order) so
/// printing a map and iterating it are deterministic.
#[derive(Debug, Default)]
pub struct MapData {
    pub model: Option<Rc<Model>>,
    entries: Vec<(String, Value, Value)>,
}

impl MapData {
    pub fn new(model: Option<Rc<Model>>) -> Self {
        MapData {
            model,
            entries: Vec::new(),
        }
    }

    fn find(&self, hash: &str) -> Option<usize> {
        self.entries.iter().position(|(h, _, _)| h == hash)
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, VmError> {
        let hash = hash_key(key)?;
        Ok(self.find(&hash).map(|i| self.entries[i].2.clone()))
    }

    pub fn set(&mut self, key: Value, value: Value) -> Result<(), VmError> {
        let hash = hash_key(&key)?;
        match self.find(&hash) {
            Some(i) => self.entries[i].2 = value,
            None => self.entries.push((hash, key, value)),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(_, k, v)| (k, v))
    }
}

#[derive(Debug)]
pub struct IteratorState {
    items: Vec<Value>,
    index: usize,
}

impl IteratorState {
    pub fn next_item(&mut self) -> Option<Value> {
        let item = self.items.get(self.index).cloned();
        if item.is_some() {
            self.index += 1;
        }
        item
    }
}

/// Canonical structural encoding of a value used as a map key. Equal
/// values always hash equal; collections that would make the key's
/// identity ambiguous (lists, maps, functions, ...) aren't hashable.
pub fn hash_key(v: &Value) -> Result<String, VmError> {
    match v {
        Value::Nil => Ok("n".to_string()),
        Value::Boolean(b) => Ok(format!("b{b}")),
        // Normalise -0.0 to 0.0 so it hashes the same as its IEEE equal.
        Value::Number(n) => Ok(format!("f{:?}", n + 0.0)),
        Value::String(s) => Ok(format!("s{s}")),
        Value::Tuple(items) => {
            let parts = items
                .iter()
                .map(hash_key)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("t{}", parts.join("\u{1}")))
        }
        Value::List(_) => Err(VmError::structure_error("lists cannot be used as map keys")),
        Value::Map(_) => Err(VmError::structure_error("maps cannot be used as map keys")),
        Value::Function(_) => Err(VmError::structure_error("functions cannot be used as map keys")),
        Value::Builtin(_) => Err(VmError::structure_error("builtins cannot be used as map keys")),
        Value::Model(_) => Err(VmError::structure_error("models cannot be used as map keys")),
        Value::Iterator(_) => Err(VmError::structure_error("iterators cannot be used as map keys")),
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::Model(_) => "model",
            Value::Iterator(_) => "iterator",
        }
    }

    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn numeric(&self) -> Result<f64, VmError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Nil => Ok(0.0),
            other => Err(VmError::type_error(format!(
                "{} has no numeric value",
                other.type_name()
            ))),
        }
    }

    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return false;
                }
                a.pairs().all(|(k, v)| match b.get(k) {
                    Ok(Some(other_v)) => v.equals(&other_v),
                    _ => false,
                })
            }
            _ => false,
        }
    }

    pub fn unary_not(&self) -> Result<Value, VmError> {
        match self {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(VmError::type_error(format!(
                "cannot negate a {}",
                other.type_name()
            ))),
        }
    }

    pub fn unary_neg(&self) -> Result<Value, VmError> {
        match self {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(VmError::type_error(format!(
                "cannot apply unary '-' to a {}",
                other.type_name()
            ))),
        }
    }

    pub fn unary_pos(&self) -> Result<Value, VmError> {
        match self {
            Value::Number(n) => Ok(Value::Number(*n)),
            other => Err(VmError::type_error(format!(
                "cannot apply unary '+' to a {}",
                other.type_name()
            ))),
        }
    }

    /// `,x` always succeeds: it wraps any value in a 1-tuple.
    pub fn unary_tuple(self) -> Value {
        Value::tuple(vec![self])
    }

    pub fn binary_add(&self, rhs: &Value) -> Result<Value, VmError> {
        match (self, rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::string(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Ok(Value::list(items))
            }
            (Value::Number(l), _) => Ok(Value::Number(l + rhs.numeric()?)),
            _ => Err(self.binary_type_error("+", rhs)),
        }
    }

    pub fn binary_sub(&self, rhs: &Value) -> Result<Value, VmError> {
        self.numeric_binop("-", rhs, |l, r| l - r)
    }

    pub fn binary_mul(&self, rhs: &Value) -> Result<Value, VmError> {
        self.numeric_binop("*", rhs, |l, r| l * r)
    }

    pub fn binary_div(&self, rhs: &Value) -> Result<Value, VmError> {
        self.numeric_binop("/", rhs, |l, r| l / r)
    }

    pub fn binary_exp(&self, rhs: &Value) -> Result<Value, VmError> {
        self.numeric_binop("^", rhs, f64::powf)
    }

    pub fn binary_floor_div(&self, rhs: &Value) -> Result<Value, VmError> {
        self.numeric_binop("//", rhs, |l, r| (l / r).floor())
    }

    pub fn binary_mod(&self, rhs: &Value) -> Result<Value, VmError> {
        self.numeric_binop("%", rhs, |l, r| l % r)
    }

    fn numeric_binop(
        &self,
        op: &str,
        rhs: &Value,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Value, VmError> {
        match self {
            Value::Number(l) => Ok(Value::Number(f(*l, rhs.numeric()?))),
            _ => Err(self.binary_type_error(op, rhs)),
        }
    }

    pub fn binary_lt(&self, rhs: &Value) -> Result<Value, VmError> {
        self.compare("<", rhs, |o| o == std::cmp::Ordering::Less)
    }

    pub fn binary_gt(&self, rhs: &Value) -> Result<Value, VmError> {
        self.compare(">", rhs, |o| o == std::cmp::Ordering::Greater)
    }

    pub fn binary_lt_eq(&self, rhs: &Value) -> Result<Value, VmError> {
        self.compare("<=", rhs, |o| o != std::cmp::Ordering::Greater)
    }

    pub fn binary_gt_eq(&self, rhs: &Value) -> Result<Value, VmError> {
        self.compare(">=", rhs, |o| o != std::cmp::Ordering::Less)
    }

    fn compare(
        &self,
        op: &str,
        rhs: &Value,
        accept: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<Value, VmError> {
        match (self, rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::Boolean(accept(a.cmp(b)))),
            (Value::Number(_), _) => {
                let l = self.numeric()?;
                let r = rhs.numeric()?;
                let ordering = l
                    .partial_cmp(&r)
                    .ok_or_else(|| VmError::type_error("cannot order NaN"))?;
                Ok(Value::Boolean(accept(ordering)))
            }
            _ => Err(self.binary_type_error(op, rhs)),
        }
    }

    pub fn binary_eq(&self, rhs: &Value) -> Result<Value, VmError> {
        Ok(Value::Boolean(self.equals(rhs)))
    }

    pub fn binary_not_eq(&self, rhs: &Value) -> Result<Value, VmError> {
        Ok(Value::Boolean(!self.equals(rhs)))
    }

    pub fn binary_or(&self, rhs: &Value) -> Result<Value, VmError> {
        self.bool_binop("||", rhs, |l, r| l || r)
    }

    pub fn binary_and(&self, rhs: &Value) -> Result<Value, VmError> {
        self.bool_binop("&&", rhs, |l, r| l && r)
    }

    pub fn binary_bit_or(&self, rhs: &Value) -> Result<Value, VmError> {
        match (self, rhs) {
            (Value::Number(_), Value::Number(_)) => {
                self.numeric_bitop("|", rhs, |l, r| l | r)
            }
            _ => self.bool_binop("|", rhs, |l, r| l || r),
        }
    }

    pub fn binary_bit_and(&self, rhs: &Value) -> Result<Value, VmError> {
        match (self, rhs) {
            (Value::Number(_), Value::Number(_)) => {
                self.numeric_bitop("&", rhs, |l, r| l & r)
            }
            _ => self.bool_binop("&", rhs, |l, r| l && r),
        }
    }

    /// Truncates both operands to `i64`, applies `f`, and converts the
    /// result back to `f64` — matching the ground truth's integer-bitwise
    /// treatment of `Number | Number` / `Number & Number`.
    fn numeric_bitop(&self, op: &str, rhs: &Value, f: impl Fn(i64, i64) -> i64) -> Result<Value, VmError> {
        match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(f(*a as i64, *b as i64) as f64)),
            _ => Err(self.binary_type_error(op, rhs)),
        }
    }

    fn bool_binop(&self, op: &str, rhs: &Value, f: impl Fn(bool, bool) -> bool) -> Result<Value, VmError> {
        match (self, rhs) {
            (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(f(*a, *b))),
            _ => Err(self.binary_type_error(op, rhs)),
        }
    }

    fn binary_type_error(&self, op: &str, rhs: &Value) -> VmError {
        VmError::type_error(format!(
            "cannot apply '{op}' between {} and {}",
            self.type_name(),
            rhs.type_name()
        ))
    }

    /// `,`: chains two values into (or onto) a tuple, matching `a, b, c`
    /// desugaring to a flat 3-tuple rather than a tuple of tuples.
    pub fn binary_tuple(&self, rhs: &Value) -> Value {
        let mut items = match self {
            Value::Tuple(items) => items.as_ref().clone(),
            other => vec![other.clone()],
        };
        items.push(rhs.clone());
        Value::tuple(items)
    }

    pub fn items(&self) -> Result<Vec<Value>, VmError> {
        match self {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.as_ref().clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
            Value::Map(m) => Ok(m
                .borrow()
                .pairs()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect()),
            other => Err(VmError::structure_error(format!(
                "{} has no items",
                other.type_name()
            ))),
        }
    }

    pub fn iter(&self) -> Result<Value, VmError> {
        let items = self.items()?;
        Ok(Value::Iterator(Rc::new(RefCell::new(IteratorState {
            items,
            index: 0,
        }))))
    }

    pub fn subscript(&self, index: &Value) -> Result<Value, VmError> {
        match self {
            Value::List(items) => {
                let items = items.borrow();
                let i = index_of(index, items.len())?;
                Ok(items[i].clone())
            }
            Value::Tuple(items) => {
                let i = index_of(index, items.len())?;
                Ok(items[i].clone())
            }
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = index_of(index, chars.len())?;
                Ok(Value::string(chars[i].to_string()))
            }
            Value::Map(m) => {
                let map = m.borrow();
                if let Some(v) = map.get(index)? {
                    return Ok(v);
                }
                if let (Some(model), Value::String(name)) = (&map.model, index) {
                    if let Some(func) = model.get_method(name) {
                        return Ok(Value::Function(Rc::new(Function {
                            params: func.params.clone(),
                            code: func.code.clone(),
                            receiver: Some(self.clone()),
                        })));
                    }
                }
                Err(VmError::index_error(format!(
                    "map has no key {}",
                    display_value(index)
                )))
            }
            Value::Model(model) => {
                if let Value::String(name) = index {
                    model
                        .get_method(name)
                        .map(Value::Function)
                        .ok_or_else(|| VmError::name_error(format!("model has no method '{name}'")))
                } else {
                    Err(VmError::type_error("models are only subscriptable by name"))
                }
            }
            other => Err(VmError::type_error(format!(
                "{} is not subscriptable",
                other.type_name()
            ))),
        }
    }

    pub fn set_subscript(&self, index: &Value, value: Value) -> Result<(), VmError> {
        match self {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let i = index_of(index, items.len())?;
                items[i] = value;
                Ok(())
            }
            Value::Map(m) => m.borrow_mut().set(index.clone(), value),
            Value::Model(model) => match (index, value) {
                (Value::String(name), Value::Function(func)) => {
                    model.set_method(name.to_string(), func);
                    Ok(())
                }
                _ => Err(VmError::type_error(
                    "model fields can only be assigned functions, by name",
                )),
            },
            other => Err(VmError::type_error(format!(
                "cannot assign into a {}",
                other.type_name()
            ))),
        }
    }
}

fn index_of(index: &Value, len: usize) -> Result<usize, VmError> {
    let Value::Number(n) = index else {
        return Err(VmError::type_error("index must be a number"));
    };
    let i = *n as i64;
    if i < 0 || i as usize >= len {
        return Err(VmError::index_error(format!(
            "index {i} out of range (length {len})"
        )));
    }
    Ok(i as usize)
}

fn display_value(v: &Value) -> String {
    format!("{v}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::List(items) => {
                let items = items.borrow();
                write!(f, "[{}]", join(&items))
            }
            Value::Tuple(items) => write!(f, "({})", join(items)),
            Value::Map(m) => {
                let m = m.borrow();
                if m.is_empty() {
                    write!(f, "{{}}")
                } else {
                    let parts: Vec<String> = m.pairs().map(|(k, v)| format!("{k}: {v}")).collect();
                    write!(f, "{{{}}}", parts.join(", "))
                }
            }
            Value::Function(_) => write!(f, "<function>"),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::Model(_) => write!(f, "<model>"),
            Value::Iterator(_) => write!(f, "<iterator>"),
        }
    }
}

fn join(items: &[Value]) -> String {
    items
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitwise_or_and_and_truncate_numbers_to_i64() {
        assert_eq!(Value::Number(6.0).binary_bit_or(&Value::Number(3.0)).unwrap().numeric().unwrap(), 7.0);
        assert_eq!(Value::Number(6.0).binary_bit_and(&Value::Number(3.0)).unwrap().numeric().unwrap(), 2.0);
    }

    #[test]
    fn truthiness_matches_spec() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::string("").is_truthy());
    }

    #[test]
    fn tuple_comma_flattens() {
        let a = Value::Number(1.0);
        let ab = a.binary_tuple(&Value::Number(2.0));
        let abc = ab.binary_tuple(&Value::Number(3.0));
        match abc {
            Value::Tuple(items) => assert_eq!(items.len(), 3),
            other => panic!("expected tuple, got {other:?}"),
        }
    }

    #[test]
    fn map_set_get_roundtrip() {
        let map = Value::Map(Rc::new(RefCell::new(MapData::new(None))));
        map.set_subscript(&Value::string("x"), Value::Number(1.0)).unwrap();
        assert_eq!(map.subscript(&Value::string("x")).unwrap().to_string(), "1");
    }

    #[test]
    fn negative_zero_hashes_like_zero() {
        assert_eq!(
            hash_key(&Value::Number(0.0)).unwrap(),
            hash_key(&Value::Number(-0.0)).unwrap()
        );
    }

    #[test]
    fn list_index_out_of_range_is_index_error() {
        let list = Value::list(vec![Value::Number(1.0)]);
        let err = list.subscript(&Value::Number(5.0)).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Index);
    }

    #[test]
    fn model_method_dispatch_binds_receiver() {
        let model = Rc::new(Model::new(vec!["x".into()]));
        let func = Rc::new(Function {
            params: vec!["self".into()],
            code: Rc::new(CompiledCode::default()),
            receiver: None,
        });
        model.set_method("greet".into(), func);
        let map = Value::Map(Rc::new(RefCell::new(MapData::new(Some(model)))));
        match map.subscript(&Value::string("greet")).unwrap() {
            Value::Function(f) => assert!(f.receiver.is_some()),
            other => panic!("expected bound method, got {other:?}"),
        }
    }
}
