/* Method and type descriptors as they appear on smali .method lines */
/* e.g. verifyIntegrity(Landroid/content/Context;)V */

use crate::error::PatchError;
use crate::smali_parse::parse_method_descriptor;
use nom::combinator::all_consuming;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single JNI type descriptor: primitive, object or array
///
/// # Examples
///
/// ```
///  use pairip_patcher::types::TypeDescriptor;
///
///  let t = TypeDescriptor::Array(Box::new(TypeDescriptor::Primitive('B')));
///  assert_eq!(t.to_jni(), "[B");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeDescriptor {
    Primitive(char),
    Object(String),
    Array(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn to_jni(&self) -> String {
        match self {
            TypeDescriptor::Primitive(c) => c.to_string(),
            TypeDescriptor::Object(class_name) => format!("L{class_name};"),
            TypeDescriptor::Array(inner) => format!("[{}", inner.to_jni()),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_jni())
    }
}

/// Parameter list and return type of a method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub args: Vec<TypeDescriptor>,
    pub result: TypeDescriptor,
}

impl MethodDescriptor {
    pub fn to_jni(&self) -> String {
        let mut s = "(".to_string();
        for a in &self.args {
            s.push_str(&a.to_jni());
        }
        s.push(')');
        s.push_str(&self.result.to_jni());
        s
    }
}

/// Identifies one method inside a class by name and exact descriptor.
///
/// Two methods with the same name but different parameters are different
/// identities, which is what keeps overloads from being patched by mistake.
///
/// # Examples
///
/// ```
///  use pairip_patcher::types::MethodIdentity;
///
///  let m: MethodIdentity = "verifyIntegrity(Landroid/content/Context;)V".parse().unwrap();
///  assert_eq!(m.name, "verifyIntegrity");
///  assert_eq!(m.descriptor.args.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodIdentity {
    pub name: String,
    pub descriptor: MethodDescriptor,
}

impl MethodIdentity {
    pub fn matches(&self, header: &MethodHeader) -> bool {
        self.name == header.name && self.descriptor == header.descriptor
    }
}

impl FromStr for MethodIdentity {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let open = s
            .find('(')
            .ok_or_else(|| PatchError::InvalidIdentity(s.to_string()))?;
        let (name, descriptor) = s.split_at(open);
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(PatchError::InvalidIdentity(s.to_string()));
        }
        match all_consuming(parse_method_descriptor)(descriptor) {
            Ok((_, descriptor)) => Ok(MethodIdentity {
                name: name.to_string(),
                descriptor,
            }),
            Err(_) => Err(PatchError::InvalidIdentity(s.to_string())),
        }
    }
}

impl fmt::Display for MethodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor.to_jni())
    }
}

/// A parsed `.method` declaration line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHeader {
    /// Access flags in declaration order, e.g. `public`, `static`
    pub modifiers: Vec<String>,
    /// Static initialisers and constructors carry the `constructor` flag
    pub constructor: bool,
    pub name: String,
    pub descriptor: MethodDescriptor,
}

impl MethodHeader {
    pub fn identity(&self) -> MethodIdentity {
        MethodIdentity {
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
        }
    }
}
