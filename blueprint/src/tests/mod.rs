#[cfg(test)]
mod common;
#[cfg(test)]
mod test_blueprint;
#[cfg(test)]
mod test_reference;
#[cfg(test)]
mod test_variadic;
