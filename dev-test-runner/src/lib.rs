//! Native side of the demo fixture. The shim generated from
//! `fixtures/demo.json` is compiled into [`ffi`] and refers back to these
//! items through `crate::`.

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    NoData,
    Toggle(bool),
    KeyValue { key: String, value: String },
}

pub fn greet(person: &Person) -> String {
    format!("Hello, {}! You are {} years old.", person.name, person.age)
}

pub fn parse_age(text: &str) -> Result<u32, String> {
    text.trim().parse().map_err(|_| format!("`{text}` is not an age"))
}

pub fn find_nickname(name: &str) -> Option<String> {
    match name {
        "Randall" => Some("Randy".to_string()),
        "Katherine" => Some("Kate".to_string()),
        _ => None,
    }
}

pub fn describe(message: &Message) -> String {
    match message {
        Message::NoData => "no data".to_string(),
        Message::Toggle(on) => format!("toggle {}", if *on { "on" } else { "off" }),
        Message::KeyValue { key, value } => format!("{key}={value}"),
    }
}

pub fn lucky_number(seed: Option<u32>) -> Option<u32> {
    seed.map(|seed| seed.wrapping_mul(7) % 100)
}

pub fn adopt(person: Person) -> String {
    format!("{} was adopted", person.name)
}

pub fn explode() {
    panic!("boom");
}

impl Person {
    pub fn rename(self, new_name: &str) -> Person {
        Person { name: new_name.to_string(), ..self }
    }

    pub fn is_adult(&self) -> bool {
        self.age >= 18
    }
}

pub fn invert(flag: Option<bool>) -> Option<bool> {
    flag.map(|flag| !flag)
}

/// The older of the two, or nobody when there is no one to compare with.
pub fn elder(person: &Person, other: Option<Person>) -> Option<Person> {
    let other = other?;
    Some(if other.age > person.age { other } else { person.clone() })
}

pub fn flip(message: Message) -> Message {
    match message {
        Message::Toggle(on) => Message::Toggle(!on),
        other => other,
    }
}

pub fn require_toggle(message: &Message) -> Result<(), Message> {
    match message {
        Message::Toggle(_) => Ok(()),
        other => Err(other.clone()),
    }
}

pub mod ffi {
    include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
}
