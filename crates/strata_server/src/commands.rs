use glam::{IVec3, Vec3};

const DEFAULT_RAYCAST_DISTANCE: f32 = 8.0;
const MAX_TICKS_PER_COMMAND: u32 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Noop,
    Stop,
    Help,
    Status,
    Save,
    SetBlock {
        pos: IVec3,
        /// Block name or numeric id, resolved against the registry.
        block: String,
        metadata: u8,
    },
    GetBlock(IVec3),
    Raycast {
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    },
    Collide {
        x: f32,
        y: f32,
        z: f32,
        half_width: f32,
        height: f32,
    },
    Highest {
        x: i32,
        z: i32,
    },
    Tick(u32),
    InvalidUsage(String),
    Unknown(String),
}

pub const HELP_LINES: &[&str] = &[
    "/help",
    "/status",
    "/save",
    "/setblock <x> <y> <z> <name|id> [meta]",
    "/getblock <x> <y> <z>",
    "/raycast <ox> <oy> <oz> <dx> <dy> <dz> [max]",
    "/collide <x> <y> <z> <halfwidth> <height>",
    "/highest <x> <z>",
    "/tick [n]",
    "/stop",
];

fn parse_numbers<T: std::str::FromStr>(args: &[&str]) -> Option<Vec<T>> {
    args.iter().map(|arg| arg.parse::<T>().ok()).collect()
}

fn parse_finite(args: &[&str]) -> Option<Vec<f32>> {
    parse_numbers::<f32>(args).filter(|values| values.iter().all(|value| value.is_finite()))
}

fn usage(text: &str) -> Command {
    Command::InvalidUsage(format!("Usage: {text}"))
}

pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Noop;
    }

    let input = trimmed.strip_prefix('/').unwrap_or(trimmed);
    if input.is_empty() {
        return Command::Noop;
    }

    let mut head_tail = input.splitn(2, char::is_whitespace);
    let command = head_tail.next().unwrap_or_default().to_ascii_lowercase();
    let rest = head_tail.next().unwrap_or("").trim();
    let args: Vec<&str> = rest.split_whitespace().collect();

    match command.as_str() {
        "stop" => Command::Stop,
        "help" => Command::Help,
        "status" => Command::Status,
        "save" => Command::Save,
        "setblock" => {
            const USAGE: &str = "/setblock <x> <y> <z> <name|id> [meta]";
            if !(4..=5).contains(&args.len()) {
                return usage(USAGE);
            }
            let Some(coords) = parse_numbers::<i32>(&args[..3]) else {
                return usage(USAGE);
            };
            let metadata = match args.get(4) {
                Some(meta) => match meta.parse::<u8>() {
                    Ok(meta) => meta,
                    Err(_) => return usage(USAGE),
                },
                None => 0,
            };
            Command::SetBlock {
                pos: IVec3::new(coords[0], coords[1], coords[2]),
                block: args[3].to_ascii_lowercase(),
                metadata,
            }
        }
        "getblock" => match parse_numbers::<i32>(&args) {
            Some(coords) if coords.len() == 3 => {
                Command::GetBlock(IVec3::new(coords[0], coords[1], coords[2]))
            }
            _ => usage("/getblock <x> <y> <z>"),
        },
        "raycast" => match parse_finite(&args) {
            Some(values) if values.len() == 6 || values.len() == 7 => Command::Raycast {
                origin: Vec3::new(values[0], values[1], values[2]),
                direction: Vec3::new(values[3], values[4], values[5]),
                max_distance: values.get(6).copied().unwrap_or(DEFAULT_RAYCAST_DISTANCE),
            },
            _ => usage("/raycast <ox> <oy> <oz> <dx> <dy> <dz> [max]"),
        },
        "collide" => match parse_finite(&args) {
            Some(values) if values.len() == 5 => Command::Collide {
                x: values[0],
                y: values[1],
                z: values[2],
                half_width: values[3],
                height: values[4],
            },
            _ => usage("/collide <x> <y> <z> <halfwidth> <height>"),
        },
        "highest" => match parse_numbers::<i32>(&args) {
            Some(values) if values.len() == 2 => Command::Highest {
                x: values[0],
                z: values[1],
            },
            _ => usage("/highest <x> <z>"),
        },
        "tick" => match args.as_slice() {
            [] => Command::Tick(1),
            [count] => match count.parse::<u32>() {
                Ok(count) if (1..=MAX_TICKS_PER_COMMAND).contains(&count) => Command::Tick(count),
                _ => Command::InvalidUsage(format!(
                    "Usage: /tick [n], where n is between 1 and {MAX_TICKS_PER_COMMAND}"
                )),
            },
            _ => usage("/tick [n]"),
        },
        _ => Command::Unknown(input.to_string()),
    }
}
