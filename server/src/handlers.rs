//! Command handlers and the descriptor list the codec is built from.
//!
//! A handler reads its own opcode byte and exactly its own fields, then
//! validates before it mutates anything. Rejections that the player can
//! recover from are `GameLogic` errors; the dispatch loop logs them and
//! moves on.

use crate::codec::{AuthRequirement, CommandDescriptor, Handler};
use crate::dispatch::Session;
use crate::error::{CommandError, WorldError};
use crate::player::Player;
use crate::world::MoveOutcome;
use log::{debug, info};
use shared::commands::client::{
    ChangeHeading, EquipItem, LoginExistingChar, Online, Ping, Quit, RequestPositionUpdate, Talk,
    UpTime, Walk, Whisper, Yell,
};
use shared::commands::server::{
    ChangeMap, ChatOverHead, ConsoleMsg, Disconnect, ErrorMsg, Logged, Pong, PosUpdate, ShowMessageBox,
    UserCharIndexInServer, UserIndexInServer,
};
use shared::{CharIndex, ClientOpcode, FrameBuffer, MapId};
use std::collections::HashSet;
use std::time::Duration;

const USER_CLASS: u8 = 0;
const TALK_COLOR: (u8, u8, u8) = (255, 255, 255);
const YELL_COLOR: (u8, u8, u8) = (255, 0, 0);
const WHISPER_COLOR: (u8, u8, u8) = (0, 128, 255);

const CHARACTER_CREATION_HINT: &str =
    "Characters are created in game. Log in with the name and password you want to use.";

/// Every client opcode with its authentication requirement and handler.
///
/// Attack, pick-up and the safe toggle carry no payload and are accepted as
/// no-ops. Any other opcode without game logic is refused: the connection is
/// dropped as if the opcode were unknown, because its payload cannot be
/// skipped safely.
pub fn descriptors() -> Vec<CommandDescriptor> {
    use AuthRequirement::{Authenticated, Unauthenticated};

    let implemented: [(ClientOpcode, AuthRequirement, Handler); 17] = [
        (ClientOpcode::LoginExistingChar, Unauthenticated, login_existing_char),
        (ClientOpcode::LoginNewChar, Unauthenticated, login_new_char),
        (ClientOpcode::ThrowDices, Unauthenticated, unsupported),
        (ClientOpcode::Talk, Authenticated, talk),
        (ClientOpcode::Yell, Authenticated, yell),
        (ClientOpcode::Whisper, Authenticated, whisper),
        (ClientOpcode::Walk, Authenticated, walk),
        (ClientOpcode::RequestPositionUpdate, Authenticated, request_position_update),
        (ClientOpcode::ChangeHeading, Authenticated, change_heading),
        (ClientOpcode::EquipItem, Authenticated, equip_item),
        (ClientOpcode::Online, Authenticated, online),
        (ClientOpcode::UpTime, Authenticated, up_time),
        (ClientOpcode::Ping, Authenticated, ping),
        (ClientOpcode::Quit, Authenticated, quit),
        (ClientOpcode::Attack, Authenticated, ignored),
        (ClientOpcode::PickUp, Authenticated, ignored),
        (ClientOpcode::SafeToggle, Authenticated, ignored),
    ];

    let covered: HashSet<ClientOpcode> = implemented.iter().map(|(op, ..)| *op).collect();
    let mut list: Vec<CommandDescriptor> = implemented
        .into_iter()
        .map(|(opcode, auth, handler)| CommandDescriptor::new(opcode, auth, handler))
        .collect();
    list.extend(
        ClientOpcode::ALL
            .iter()
            .filter(|op| !covered.contains(op))
            .map(|op| CommandDescriptor::new(*op, Authenticated, unsupported)),
    );
    list
}

fn unsupported(_: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    let raw = buf.peek_u8()?;
    match ClientOpcode::from_u8(raw) {
        Some(opcode) => Err(CommandError::Unsupported(opcode)),
        None => Err(CommandError::UnknownOpcode(raw)),
    }
}

/// Consumes a bare opcode that has no effect yet.
fn ignored(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    let raw = buf.read_u8()?;
    if let Some(opcode) = ClientOpcode::from_u8(raw) {
        debug!("Connection {}: ignoring {}", session.connection.id, opcode);
    }
    Ok(())
}

/// Queues an explanation for the client and refuses the login.
fn refuse(session: &mut Session<'_>, reason: String) -> Result<(), CommandError> {
    session.reply(ErrorMsg {
        message: reason.clone(),
    });
    Err(CommandError::Refused(reason))
}

fn current_map(session: &Session<'_>) -> Result<(CharIndex, MapId), CommandError> {
    let index = session.player_index()?;
    let map = session
        .registry
        .player(index)
        .and_then(|p| p.map)
        .ok_or(CommandError::from(WorldError::NotOnMap(index)))?;
    Ok((index, map))
}

fn login_existing_char(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    let login = LoginExistingChar::read(buf)?;
    debug!(
        "Login attempt for {:?} with client {}.{}.{}",
        login.name, login.version_major, login.version_minor, login.version_patch
    );

    if let Err(reason) = session.names.check(&login.name) {
        return refuse(session, format!("Invalid name: {}.", reason));
    }
    let max_players = session.registry.limits().max_players;
    if session.registry.player_count() >= max_players {
        return refuse(session, "The server is full.".to_string());
    }
    if session.registry.player_by_name(&login.name).is_some() {
        return refuse(session, format!("{} is already online.", login.name));
    }

    let start_map = session.config.world.start_map;
    let start = session
        .config
        .world
        .start_position()
        .ok_or_else(|| CommandError::Internal("start position outside the map".into()))?;
    let landing = session.world.ensure(start_map)?.find_free_near(start);
    let landing = match landing {
        Some(pos) => pos,
        None => return refuse(session, "There is no room at the starting point.".to_string()),
    };

    let player = Player::new(login.name.as_str(), session.connection.id, landing);
    let index = match session.registry.register_player(player) {
        Ok(index) => index,
        Err(e) => return refuse(session, e.to_string()),
    };
    session.connection.player = Some(index);

    session.reply(UserIndexInServer { user_index: index });
    session.reply(UserCharIndexInServer { char_index: index });
    session.reply(ChangeMap {
        map: start_map,
        version: 0,
    });
    if let Err(e) = session
        .world
        .player_join(session.registry, index, start_map, landing, session.outbox)
    {
        session.registry.unregister_player(index);
        session.connection.player = None;
        return Err(e.into());
    }
    session.reply(Logged {
        user_class: USER_CLASS,
    });
    session.reply(ConsoleMsg::server(session.config.world.welcome_message.clone()));

    info!(
        "{} entered map {} from {} (character {})",
        login.name, start_map, session.connection.addr, index
    );
    Ok(())
}

fn login_new_char(session: &mut Session<'_>, _: &mut FrameBuffer) -> Result<(), CommandError> {
    session.reply(ShowMessageBox {
        message: CHARACTER_CREATION_HINT.to_string(),
    });
    Err(CommandError::Refused("character creation is not available".into()))
}

fn chat_to_map(
    session: &mut Session<'_>,
    message: String,
    color: (u8, u8, u8),
) -> Result<(), CommandError> {
    let (index, map) = current_map(session)?;
    if message.is_empty() {
        return Ok(());
    }
    let (red, green, blue) = color;
    session.world.broadcast(
        map,
        None,
        ChatOverHead {
            message,
            char_index: index,
            red,
            green,
            blue,
        },
        session.outbox,
    );
    Ok(())
}

fn talk(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    let talk = Talk::read(buf)?;
    chat_to_map(session, talk.message, TALK_COLOR)
}

fn yell(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    let yell = Yell::read(buf)?;
    chat_to_map(session, yell.message, YELL_COLOR)
}

fn whisper(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    let whisper = Whisper::read(buf)?;
    let (index, map) = current_map(session)?;

    let target = session
        .registry
        .player(whisper.target)
        .filter(|p| p.map == Some(map))
        .map(|p| p.connection);
    let Some(target_connection) = target else {
        session.reply(ConsoleMsg::info("That user is not here."));
        return Err(CommandError::GameLogic(format!(
            "whisper target {} is not on map {}",
            whisper.target, map
        )));
    };

    let (red, green, blue) = WHISPER_COLOR;
    let line = ChatOverHead {
        message: whisper.message,
        char_index: index,
        red,
        green,
        blue,
    };
    if target_connection != session.connection.id {
        session.outbox.send(target_connection, line.clone());
    }
    session.reply(line);
    Ok(())
}

fn walk(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    let walk = Walk::read(buf)?;
    let index = session.player_index()?;

    match session
        .world
        .player_move(session.registry, index, walk.heading, session.outbox)
    {
        Ok(MoveOutcome::Moved(_)) => Ok(()),
        Ok(MoveOutcome::Transitioned { pos, .. }) => {
            session.reply(PosUpdate { x: pos.x, y: pos.y });
            Ok(())
        }
        Err(e) if e.is_game_logic() => {
            if let Some(player) = session.registry.player(index) {
                let pos = player.pos;
                session.reply(PosUpdate { x: pos.x, y: pos.y });
            }
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn request_position_update(
    session: &mut Session<'_>,
    buf: &mut FrameBuffer,
) -> Result<(), CommandError> {
    RequestPositionUpdate::read(buf)?;
    let index = session.player_index()?;
    let pos = session
        .registry
        .player(index)
        .map(|p| p.pos)
        .ok_or_else(|| CommandError::Internal(format!("character {} vanished", index)))?;
    session.reply(PosUpdate { x: pos.x, y: pos.y });
    Ok(())
}

fn change_heading(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    let change = ChangeHeading::read(buf)?;
    let (index, map) = current_map(session)?;

    let update = match session.registry.player_mut(index) {
        Some(player) => {
            player.heading = change.heading;
            player.character_change()
        }
        None => return Err(CommandError::Internal(format!("character {} vanished", index))),
    };
    session.world.broadcast(map, None, update, session.outbox);
    Ok(())
}

fn equip_item(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    let equip = EquipItem::read(buf)?;
    let index = session.player_index()?;

    let player = session
        .registry
        .player_mut(index)
        .ok_or_else(|| CommandError::Internal(format!("character {} vanished", index)))?;
    if player.toggle_equipped(equip.slot).is_none() {
        return Err(CommandError::GameLogic(format!(
            "inventory slot {} is empty",
            equip.slot
        )));
    }
    let update = player.inventory_slot_update(equip.slot);
    session.reply(update);
    Ok(())
}

fn online(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    Online::read(buf)?;
    let count = session.registry.player_count();
    session.reply(ConsoleMsg::info(format!("Online: {}", count)));
    Ok(())
}

fn up_time(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    UpTime::read(buf)?;
    let uptime = format_uptime(session.started.elapsed());
    session.reply(ConsoleMsg::info(format!("Server uptime: {}", uptime)));
    Ok(())
}

fn ping(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    Ping::read(buf)?;
    session.reply(Pong {});
    Ok(())
}

fn quit(session: &mut Session<'_>, buf: &mut FrameBuffer) -> Result<(), CommandError> {
    Quit::read(buf)?;
    session.reply(Disconnect {});
    session.connection.request_close();
    Ok(())
}

pub fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (days, rest) = (total / 86_400, total % 86_400);
    let (hours, rest) = (rest / 3_600, rest % 3_600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else {
        format!("{}h {}m {}s", hours, minutes, seconds)
    }
}
