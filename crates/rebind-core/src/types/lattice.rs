use crate::hierarchy::{ClassHierarchy, TypeName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nullability {
    DefinitelyNull,
    DefinitelyNotNull,
    MaybeNull,
}

impl Nullability {
    pub fn join(self, other: Nullability) -> Nullability {
        if self == other {
            self
        } else {
            Nullability::MaybeNull
        }
    }

    pub fn less_than_or_equal(self, other: Nullability) -> bool {
        self == other || other == Nullability::MaybeNull
    }

    pub fn is_definitely_not_null(self) -> bool {
        self == Nullability::DefinitelyNotNull
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Int,
    Long,
    Float,
    Double,
}

/// A class or interface type with nullability.
///
/// `exact` means the runtime class is known to be exactly `class`, not a
/// subclass of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassType {
    pub class: TypeName,
    pub nullability: Nullability,
    pub exact: bool,
}

impl ClassType {
    pub fn new(class: TypeName, nullability: Nullability) -> Self {
        Self {
            class,
            nullability,
            exact: false,
        }
    }

    pub fn exact(class: TypeName, nullability: Nullability) -> Self {
        Self {
            class,
            nullability,
            exact: true,
        }
    }
}

/// Element of the type lattice: `Bottom <= ... <= Top`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeElement {
    Bottom,
    Primitive(PrimitiveType),
    /// The null constant
    Null,
    Reference(ClassType),
    Top,
}

impl TypeElement {
    pub fn from_class(class: TypeName, nullability: Nullability) -> Self {
        TypeElement::Reference(ClassType::new(class, nullability))
    }

    pub fn exact_class(class: TypeName, nullability: Nullability) -> Self {
        TypeElement::Reference(ClassType::exact(class, nullability))
    }

    pub fn nullability(&self) -> Nullability {
        match self {
            TypeElement::Null => Nullability::DefinitelyNull,
            TypeElement::Reference(class) => class.nullability,
            TypeElement::Bottom | TypeElement::Primitive(_) => Nullability::DefinitelyNotNull,
            TypeElement::Top => Nullability::MaybeNull,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TypeElement::Reference(_) | TypeElement::Null)
    }

    pub fn as_reference(&self) -> Option<&ClassType> {
        match self {
            TypeElement::Reference(class) => Some(class),
            _ => None,
        }
    }

    /// The class type, if this is a reference to a known non-interface class
    pub fn as_class_type(&self, hierarchy: &ClassHierarchy) -> Option<&ClassType> {
        let class = self.as_reference()?;
        let def = hierarchy.class_of(class.class)?;
        (!def.is_interface).then_some(class)
    }

    pub fn is_class_type(&self, hierarchy: &ClassHierarchy) -> bool {
        self.as_class_type(hierarchy).is_some()
    }

    pub fn with_nullability(&self, nullability: Nullability) -> TypeElement {
        match self {
            TypeElement::Reference(class) => TypeElement::Reference(ClassType {
                nullability,
                ..*class
            }),
            other => *other,
        }
    }

    pub fn less_than_or_equal(&self, other: &TypeElement, hierarchy: &ClassHierarchy) -> bool {
        use TypeElement::*;

        match (self, other) {
            (Bottom, _) | (_, Top) => true,
            (Top, _) | (_, Bottom) => false,
            (Primitive(a), Primitive(b)) => a == b,
            (Null, Null) => true,
            (Null, Reference(b)) => b.nullability != Nullability::DefinitelyNotNull,
            (Reference(a), Reference(b)) => {
                a.nullability.less_than_or_equal(b.nullability)
                    && hierarchy.is_subtype(a.class, b.class)
                    && (!b.exact || (a.exact && a.class == b.class))
            }
            _ => false,
        }
    }

    pub fn join(&self, other: &TypeElement, hierarchy: &ClassHierarchy) -> TypeElement {
        use TypeElement::*;

        match (self, other) {
            (Bottom, x) | (x, Bottom) => *x,
            (Top, _) | (_, Top) => Top,
            (Primitive(a), Primitive(b)) if a == b => *self,
            (Null, Null) => Null,
            (Null, Reference(r)) | (Reference(r), Null) => Reference(ClassType {
                nullability: r.nullability.join(Nullability::DefinitelyNull),
                ..*r
            }),
            (Reference(a), Reference(b)) => Reference(join_class_types(a, b, hierarchy)),
            _ => Top,
        }
    }
}

fn join_class_types(a: &ClassType, b: &ClassType, hierarchy: &ClassHierarchy) -> ClassType {
    let nullability = a.nullability.join(b.nullability);

    if a.class == b.class {
        return ClassType {
            class: a.class,
            nullability,
            exact: a.exact && b.exact,
        };
    }
    let class = if hierarchy.is_subtype(a.class, b.class) {
        b.class
    } else if hierarchy.is_subtype(b.class, a.class) {
        a.class
    } else {
        hierarchy.common_superclass(a.class, b.class)
    };
    ClassType::new(class, nullability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyBuilder;

    fn hierarchy() -> ClassHierarchy {
        let mut builder = HierarchyBuilder::new();
        builder.interface("I").finish();
        builder.class("A").implements("I").finish();
        builder.class("B").extends("A").finish();
        builder.class("C").extends("A").finish();
        builder.build()
    }

    fn ty(h: &ClassHierarchy, name: &str, nullability: Nullability) -> TypeElement {
        TypeElement::from_class(h.lookup_type(name).unwrap(), nullability)
    }

    #[test]
    fn test_subclass_less_than_superclass() {
        let h = hierarchy();
        let a = ty(&h, "A", Nullability::MaybeNull);
        let b = ty(&h, "B", Nullability::DefinitelyNotNull);
        let i = ty(&h, "I", Nullability::MaybeNull);

        assert!(b.less_than_or_equal(&a, &h));
        assert!(b.less_than_or_equal(&i, &h));
        assert!(!a.less_than_or_equal(&b, &h));
    }

    #[test]
    fn test_nullability_ordering() {
        let h = hierarchy();
        let maybe = ty(&h, "A", Nullability::MaybeNull);
        let not_null = ty(&h, "A", Nullability::DefinitelyNotNull);

        assert!(not_null.less_than_or_equal(&maybe, &h));
        assert!(!maybe.less_than_or_equal(&not_null, &h));
        assert!(TypeElement::Null.less_than_or_equal(&maybe, &h));
        assert!(!TypeElement::Null.less_than_or_equal(&not_null, &h));
    }

    #[test]
    fn test_exact_types() {
        let h = hierarchy();
        let a_class = h.lookup_type("A").unwrap();
        let b_class = h.lookup_type("B").unwrap();
        let exact_a = TypeElement::exact_class(a_class, Nullability::DefinitelyNotNull);
        let exact_b = TypeElement::exact_class(b_class, Nullability::DefinitelyNotNull);
        let a = TypeElement::from_class(a_class, Nullability::DefinitelyNotNull);

        assert!(exact_a.less_than_or_equal(&a, &h));
        assert!(exact_b.less_than_or_equal(&a, &h));
        assert!(!a.less_than_or_equal(&exact_a, &h));
        assert!(!exact_b.less_than_or_equal(&exact_a, &h));
    }

    #[test]
    fn test_join_siblings() {
        let h = hierarchy();
        let b = ty(&h, "B", Nullability::DefinitelyNotNull);
        let c = ty(&h, "C", Nullability::MaybeNull);

        assert_eq!(b.join(&c, &h), ty(&h, "A", Nullability::MaybeNull));
    }

    #[test]
    fn test_join_with_null() {
        let h = hierarchy();
        let b = ty(&h, "B", Nullability::DefinitelyNotNull);

        assert_eq!(
            TypeElement::Null.join(&b, &h),
            ty(&h, "B", Nullability::MaybeNull)
        );
        assert_eq!(TypeElement::Bottom.join(&b, &h), b);
    }

    #[test]
    fn test_join_mixed_kinds_is_top() {
        let h = hierarchy();
        let b = ty(&h, "B", Nullability::DefinitelyNotNull);

        assert_eq!(
            TypeElement::Primitive(PrimitiveType::Int).join(&b, &h),
            TypeElement::Top
        );
    }

    #[test]
    fn test_interface_is_not_class_type() {
        let h = hierarchy();
        assert!(!ty(&h, "I", Nullability::MaybeNull).is_class_type(&h));
        assert!(ty(&h, "A", Nullability::MaybeNull).is_class_type(&h));
    }
}
