//! Route strings and the controller names derived from them.
//!
//! A route has the exact form `namespace/action`. The namespace is turned
//! into two names that must agree with how controllers are registered:
//!
//! - a type name: first character upper-cased, rest unchanged, plus
//!   `Controller` (`userProfile` → `UserProfileController`);
//! - a lookup key: camelCase converted to underscore_case, lower-cased, plus
//!   `_controller` (`userProfile` → `user_profile_controller`).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Suffix appended to the namespace to form the controller type name.
pub const TYPE_NAME_SUFFIX: &str = "Controller";

/// Suffix appended to the underscored namespace to form the lookup key.
pub const LOOKUP_KEY_SUFFIX: &str = "_controller";

/// Separator between namespace and action.
pub const ROUTE_SEPARATOR: char = '/';

/// A validated `namespace/action` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    namespace: String,
    action: String,
}

/// Raised when a route string is not of the form `namespace/action`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("route '{route}' must be in 'namespace/action' format")]
pub struct RouteParseError {
    /// The rejected route string.
    pub route: String,
}

impl Route {
    /// Splits `route` on its single `/` separator.
    ///
    /// # Errors
    ///
    /// Returns [`RouteParseError`] unless the string splits into exactly two
    /// non-empty parts.
    pub fn parse(route: &str) -> Result<Self, RouteParseError> {
        let mut parts = route.split(ROUTE_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(action), None) if !namespace.is_empty() && !action.is_empty() => {
                Ok(Self {
                    namespace: namespace.to_owned(),
                    action: action.to_owned(),
                })
            }
            _ => Err(RouteParseError {
                route: route.to_owned(),
            }),
        }
    }

    /// Returns the namespace half of the route.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the action half of the route.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the controller type name derived from the namespace.
    pub fn type_name(&self) -> String {
        controller_type_name(&self.namespace)
    }

    /// Returns the controller lookup key derived from the namespace.
    pub fn lookup_key(&self) -> String {
        controller_lookup_key(&self.namespace)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}{ROUTE_SEPARATOR}{}", self.namespace, self.action)
    }
}

impl FromStr for Route {
    type Err = RouteParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

/// Derives the controller type name for `namespace`.
pub fn controller_type_name(namespace: &str) -> String {
    let mut chars = namespace.chars();
    let mut name = String::with_capacity(namespace.len() + TYPE_NAME_SUFFIX.len());
    if let Some(first) = chars.next() {
        name.extend(first.to_uppercase());
        name.push_str(chars.as_str());
    }
    name.push_str(TYPE_NAME_SUFFIX);
    name
}

/// Derives the controller lookup key for `namespace`.
pub fn controller_lookup_key(namespace: &str) -> String {
    let mut key = camel_to_underscore(namespace);
    key.push_str(LOOKUP_KEY_SUFFIX);
    key
}

/// Converts camelCase (and capitalised runs) to lower-case underscore_case.
///
/// Two passes, each scanning left to right without overlap:
///
/// 1. `_` goes before every capitalised word (`[A-Z][a-z]+`) that follows
///    any other character;
/// 2. `_` goes between a lower-case letter or digit and an upper-case letter.
///
/// The result is then lower-cased: `HTTPServer` → `http_server`,
/// `getHTTP` → `get_http`, `userProfile2Id` → `user_profile2_id`.
pub fn camel_to_underscore(input: &str) -> String {
    let first_pass = split_capitalised_words(&input.chars().collect::<Vec<_>>());
    split_lower_upper(&first_pass).to_lowercase()
}

fn split_capitalised_words(chars: &[char]) -> Vec<char> {
    let mut output = Vec::with_capacity(chars.len() + 4);
    let mut index = 0;
    while let Some(&current) = chars.get(index) {
        let word_len = capitalised_word_len(chars.get(index + 1..).unwrap_or_default());
        if current != '\n' && word_len > 0 {
            output.push(current);
            output.push('_');
            output.extend(chars.iter().skip(index + 1).take(word_len));
            index += 1 + word_len;
        } else {
            output.push(current);
            index += 1;
        }
    }
    output
}

/// Length of a leading `[A-Z][a-z]+` run, or zero when there is none.
fn capitalised_word_len(chars: &[char]) -> usize {
    match chars.split_first() {
        Some((head, tail)) if head.is_ascii_uppercase() => {
            let lower = tail.iter().take_while(|c| c.is_ascii_lowercase()).count();
            if lower == 0 { 0 } else { 1 + lower }
        }
        _ => 0,
    }
}

fn split_lower_upper(chars: &[char]) -> String {
    let mut output = String::with_capacity(chars.len() + 4);
    let mut index = 0;
    while let Some(&current) = chars.get(index) {
        output.push(current);
        match chars.get(index + 1) {
            Some(&next)
                if (current.is_ascii_lowercase() || current.is_ascii_digit())
                    && next.is_ascii_uppercase() =>
            {
                output.push('_');
                output.push(next);
                index += 2;
            }
            _ => index += 1,
        }
    }
    output
}
