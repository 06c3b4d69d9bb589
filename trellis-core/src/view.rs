//! Declarative descriptions.
//!
//! A component returns a [`View`]: a tree of descriptions the reconciler
//! diffs against the existing node tree. Descriptions are cheap values; they
//! are consumed by the reconciler and never outlive one render.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::RenderError;
use crate::reactive::{Memo, Notify, Signal, Subscription, Trackable};
use crate::render::{RenderCx, RenderFn, RenderOutcome};

// ----------------------------------------------------------------------------
// Keys
// ----------------------------------------------------------------------------

/// Explicit identity of an element among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(Arc<str>),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(n.into())
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Int(n.into())
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Self {
        Key::Int(n as i64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s.into())
    }
}

// ----------------------------------------------------------------------------
// Values and props
// ----------------------------------------------------------------------------

/// A reactive source that can feed a text node or an attribute.
pub trait Bindable: Trackable {
    fn current(&self) -> Value;
}

impl<T> Bindable for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Into<Value> + 'static,
{
    fn current(&self) -> Value {
        self.get_untracked().into()
    }
}

impl<T> Bindable for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + Into<Value> + 'static,
{
    fn current(&self) -> Value {
        self.get_untracked().into()
    }
}

/// A bound reactive source. Two bindings are equal when they bind the same
/// source.
#[derive(Clone)]
pub struct Binding(Arc<dyn Bindable>);

impl Binding {
    pub fn new(source: impl Bindable + 'static) -> Self {
        Self(Arc::new(source))
    }

    pub fn source_id(&self) -> u64 {
        self.0.source_id()
    }

    pub fn current(&self) -> Value {
        self.0.current()
    }

    pub(crate) fn watch(&self, notify: Notify) -> Subscription {
        self.0.subscribe_notify(notify)
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.source_id() == other.source_id()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binding({})", self.source_id())
    }
}

/// An event handler attached as a prop. Compared by identity.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&Value)>);

impl Handler {
    pub fn new(f: impl Fn(&Value) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, arg: &Value) {
        (self.0)(arg)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// A prop value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Cow<'static, str>),
    Handler(Handler),
    Bound(Binding),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Replace a binding with the current value of its source.
    pub fn resolve(&self) -> Value {
        match self {
            Value::Bound(binding) => binding.current().resolve(),
            other => other.clone(),
        }
    }

    /// Text rendering of a resolved value.
    pub fn to_text(&self) -> String {
        match self.resolve() {
            Value::Null | Value::Handler(_) | Value::Bound(_) => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Str(s) => s.into_owned(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self.resolve() {
            Value::Null | Value::Handler(_) | Value::Bound(_) => serde_json::Value::Null,
            Value::Bool(b) => b.into(),
            Value::Int(n) => n.into(),
            Value::Float(x) => x.into(),
            Value::Str(s) => s.into_owned().into(),
        }
    }
}

impl From<&'static str> for Value {
    fn from(s: &'static str) -> Self {
        Value::Str(Cow::Borrowed(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Cow::Owned(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Handler> for Value {
    fn from(h: Handler) -> Self {
        Value::Handler(h)
    }
}

impl From<Binding> for Value {
    fn from(b: Binding) -> Self {
        Value::Bound(b)
    }
}

impl<T> From<Signal<T>> for Value
where
    T: Clone + PartialEq + Send + Sync + Into<Value> + 'static,
{
    fn from(signal: Signal<T>) -> Self {
        Value::Bound(Binding::new(signal))
    }
}

impl<T> From<Memo<T>> for Value
where
    T: Clone + PartialEq + Send + Sync + Into<Value> + 'static,
{
    fn from(memo: Memo<T>) -> Self {
        Value::Bound(Binding::new(memo))
    }
}

/// Name under which a text node exposes its content to the host.
pub const TEXT_PROP: &str = "text";

/// Ordered attribute list of an element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props(SmallVec<[(Cow<'static, str>, Value); 4]>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Props of a text host node.
    pub fn text(content: impl Into<Cow<'static, str>>) -> Self {
        Self::new().with(TEXT_PROP, Value::Str(content.into()))
    }

    pub fn with(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    /// Append an attribute. Duplicates are kept and rejected when the
    /// element is reconciled.
    pub fn push(&mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_ref(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key-by-key comparison, ignoring order and the reserved `key` and
    /// `children` names.
    pub fn shallow_eq(&self, other: &Props) -> bool {
        let relevant = |props: &'_ Props| {
            props
                .0
                .iter()
                .filter(|(n, _)| n != "key" && n != "children")
                .count()
        };
        relevant(self) == relevant(other)
            && self
                .0
                .iter()
                .filter(|(n, _)| n != "key" && n != "children")
                .all(|(n, v)| other.get(n) == Some(v))
    }

    /// First attribute name that appears more than once.
    pub fn duplicate(&self) -> Option<&str> {
        self.0.iter().enumerate().find_map(|(i, (name, _))| {
            self.0[..i]
                .iter()
                .any(|(earlier, _)| earlier == name)
                .then_some(name.as_ref())
        })
    }

    /// Attributes bound to reactive sources.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.0.iter().filter_map(|(n, v)| match v {
            Value::Bound(binding) => Some((n.as_ref(), binding)),
            _ => None,
        })
    }

    pub fn has_bindings(&self) -> bool {
        self.bindings().next().is_some()
    }

    /// Copy with every binding replaced by its current value.
    pub fn resolve(&self) -> Props {
        Props(
            self.0
                .iter()
                .map(|(n, v)| (n.clone(), v.resolve()))
                .collect(),
        )
    }
}

// ----------------------------------------------------------------------------
// Components
// ----------------------------------------------------------------------------

struct ComponentDef {
    name: Cow<'static, str>,
    render: RenderFn,
}

/// A component function. Two components have the same type only if they are
/// clones of the same `Component`.
#[derive(Clone)]
pub struct Component(Rc<ComponentDef>);

impl Component {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, render: F) -> Self
    where
        F: Fn(&mut RenderCx<'_>) -> RenderOutcome + 'static,
    {
        Self(Rc::new(ComponentDef {
            name: name.into(),
            render: Rc::new(render),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// A description calling this component.
    pub fn element(&self) -> Element {
        Element::new(ElementKind::Component(self.clone()))
    }

    pub fn same_type(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn render_fn(&self) -> RenderFn {
        Rc::clone(&self.0.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.0.name)
    }
}

// ----------------------------------------------------------------------------
// Context
// ----------------------------------------------------------------------------

/// A value made available to a subtree by a provider element.
#[derive(Clone)]
pub struct Context<T> {
    id: u64,
    default: T,
}

impl<T> Context<T>
where
    T: Clone + PartialEq + 'static,
{
    pub fn new(default: T) -> Self {
        static CONTEXT_IDS: AtomicU64 = AtomicU64::new(0);
        Self {
            id: CONTEXT_IDS.fetch_add(1, Ordering::Relaxed),
            default,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn default_value(&self) -> T {
        self.default.clone()
    }

    /// A provider element exposing `value` to `children`.
    pub fn provide(&self, value: T, children: impl Into<View>) -> Element {
        Element::new(ElementKind::Provider(ContextValue {
            context: self.id,
            value: Rc::new(value),
            eq: eq_any::<T>,
        }))
        .children(children)
    }
}

fn eq_any<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// The value carried by a provider node.
#[derive(Clone)]
pub struct ContextValue {
    pub(crate) context: u64,
    value: Rc<dyn Any>,
    eq: fn(&dyn Any, &dyn Any) -> bool,
}

impl ContextValue {
    pub(crate) fn same_value(&self, other: &ContextValue) -> bool {
        self.context == other.context && (self.eq)(&*self.value, &*other.value)
    }

    pub(crate) fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.value.downcast_ref::<T>().cloned()
    }
}

// ----------------------------------------------------------------------------
// Error boundaries
// ----------------------------------------------------------------------------

/// Why a boundary is showing its fallback.
#[derive(Debug, Clone, Copy)]
pub enum Caught<'a> {
    Error(&'a RenderError),
    Pending,
}

type FallbackFn = Rc<dyn Fn(Caught<'_>) -> View>;
type ErrorHook = Rc<dyn Fn(&RenderError)>;

/// A structural marker that catches render errors and suspensions raised
/// below it and renders fallback content instead.
#[derive(Clone)]
pub struct Boundary {
    pub(crate) fallback: FallbackFn,
    pub(crate) on_error: Option<ErrorHook>,
}

impl Boundary {
    pub fn new(fallback: impl Fn(Caught<'_>) -> View + 'static) -> Self {
        Self {
            fallback: Rc::new(fallback),
            on_error: None,
        }
    }

    /// Observe caught errors.
    pub fn on_error(mut self, hook: impl Fn(&RenderError) + 'static) -> Self {
        self.on_error = Some(Rc::new(hook));
        self
    }

    /// Wrap `children` in this boundary.
    pub fn wrap(self, children: impl Into<View>) -> Element {
        Element::new(ElementKind::Boundary(self)).children(children)
    }
}

// ----------------------------------------------------------------------------
// Elements and views
// ----------------------------------------------------------------------------

/// What an element instantiates.
#[derive(Clone)]
pub enum ElementKind {
    Host(Cow<'static, str>),
    Component(Component),
    Fragment,
    Provider(ContextValue),
    Boundary(Boundary),
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Host(tag) => write!(f, "Host({tag})"),
            ElementKind::Component(c) => write!(f, "{c:?}"),
            ElementKind::Fragment => f.write_str("Fragment"),
            ElementKind::Provider(v) => write!(f, "Provider({})", v.context),
            ElementKind::Boundary(_) => f.write_str("Boundary"),
        }
    }
}

/// A description of one element.
#[derive(Debug, Clone)]
pub struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) key: Option<Key>,
    pub(crate) props: Props,
    pub(crate) children: View,
}

impl Element {
    fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            props: Props::new(),
            children: View::Empty,
        }
    }

    /// A host element such as `div`.
    pub fn host(tag: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ElementKind::Host(tag.into()))
    }

    pub fn fragment(children: impl Into<View>) -> Self {
        Self::new(ElementKind::Fragment).children(children)
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
        self.props.push(name, value);
        self
    }

    /// Alias of [`attr`](Self::attr) for component inputs.
    pub fn prop(self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
        self.attr(name, value)
    }

    /// Replace the children.
    pub fn children(mut self, children: impl Into<View>) -> Self {
        self.children = children.into();
        self
    }

    /// Append one child.
    pub fn child(mut self, child: impl Into<View>) -> Self {
        let child = child.into();
        self.children = match std::mem::take(&mut self.children) {
            View::Empty => View::List(vec![child]),
            View::List(mut items) => {
                items.push(child);
                View::List(items)
            }
            single => View::List(vec![single, child]),
        };
        self
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn key_ref(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn props(&self) -> &Props {
        &self.props
    }
}

/// A child description: what a component returns.
#[derive(Debug, Clone, Default)]
pub enum View {
    /// Renders nothing (`null`, `false`, unit).
    #[default]
    Empty,
    Text(Cow<'static, str>),
    /// Text bound to a reactive source.
    Bound(Binding),
    Element(Box<Element>),
    List(Vec<View>),
}

impl View {
    pub fn is_empty(&self) -> bool {
        matches!(self, View::Empty)
    }

    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<View>,
    {
        View::List(items.into_iter().map(Into::into).collect())
    }

    /// Explicit key of an element description.
    pub fn key(&self) -> Option<&Key> {
        match self {
            View::Element(el) => el.key.as_ref(),
            _ => None,
        }
    }
}

impl From<()> for View {
    fn from(_: ()) -> Self {
        View::Empty
    }
}

impl From<bool> for View {
    fn from(_: bool) -> Self {
        View::Empty
    }
}

impl From<&'static str> for View {
    fn from(s: &'static str) -> Self {
        View::Text(Cow::Borrowed(s))
    }
}

impl From<String> for View {
    fn from(s: String) -> Self {
        View::Text(Cow::Owned(s))
    }
}

impl From<i64> for View {
    fn from(n: i64) -> Self {
        View::Text(Cow::Owned(n.to_string()))
    }
}

impl From<i32> for View {
    fn from(n: i32) -> Self {
        View::Text(Cow::Owned(n.to_string()))
    }
}

impl From<usize> for View {
    fn from(n: usize) -> Self {
        View::Text(Cow::Owned(n.to_string()))
    }
}

impl From<f64> for View {
    fn from(x: f64) -> Self {
        View::Text(Cow::Owned(x.to_string()))
    }
}

impl From<Element> for View {
    fn from(el: Element) -> Self {
        View::Element(Box::new(el))
    }
}

impl From<Binding> for View {
    fn from(b: Binding) -> Self {
        View::Bound(b)
    }
}

impl<T> From<Signal<T>> for View
where
    T: Clone + PartialEq + Send + Sync + Into<Value> + 'static,
{
    fn from(signal: Signal<T>) -> Self {
        View::Bound(Binding::new(signal))
    }
}

impl<T> From<Memo<T>> for View
where
    T: Clone + PartialEq + Send + Sync + Into<Value> + 'static,
{
    fn from(memo: Memo<T>) -> Self {
        View::Bound(Binding::new(memo))
    }
}

impl<V: Into<View>> From<Option<V>> for View {
    fn from(v: Option<V>) -> Self {
        v.map_or(View::Empty, Into::into)
    }
}

impl<V: Into<View>> From<Vec<V>> for View {
    fn from(items: Vec<V>) -> Self {
        View::list(items)
    }
}
