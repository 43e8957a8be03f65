#[cfg(test)]
mod router;
#[cfg(test)]
mod support;
