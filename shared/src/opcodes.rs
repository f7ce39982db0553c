//! Ordered opcode registries for both directions of the protocol.
//!
//! An opcode's numeric value is its position in the list. Reordering, inserting
//! or removing an entry changes the meaning of every opcode after it on the
//! wire, so these lists are append-only.

macro_rules! opcode_registry {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            /// Every opcode, in wire order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn from_u8(value: u8) -> Option<Self> {
                Self::ALL.get(usize::from(value)).copied()
            }

            pub fn as_u8(self) -> u8 {
                self as u8
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)*
                }
            }

            /// Highest declared opcode value.
            pub fn last() -> u8 {
                (Self::ALL.len() - 1) as u8
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", self.name(), self.as_u8())
            }
        }
    };
}

opcode_registry! {
    /// Commands sent by clients.
    ClientOpcode {
        LoginExistingChar,
        ThrowDices,
        LoginNewChar,
        Talk,
        Yell,
        Whisper,
        Walk,
        RequestPositionUpdate,
        Attack,
        PickUp,
        SafeToggle,
        ResuscitationSafeToggle,
        RequestGuildLeaderInfo,
        RequestAtributes,
        RequestFame,
        RequestSkills,
        RequestMiniStats,
        CommerceEnd,
        UserCommerceEnd,
        UserCommerceConfirm,
        CommerceChat,
        BankEnd,
        UserCommerceOk,
        UserCommerceReject,
        Drop,
        CastSpell,
        LeftClick,
        DoubleClick,
        Work,
        UseSpellMacro,
        UseItem,
        CraftBlacksmith,
        CraftCarpenter,
        WorkLeftClick,
        CreateNewGuild,
        SpellInfo,
        EquipItem,
        ChangeHeading,
        ModifySkills,
        Train,
        CommerceBuy,
        BankExtractItem,
        CommerceSell,
        BankDeposit,
        ForumPost,
        MoveSpell,
        MoveBank,
        ClanCodexUpdate,
        UserCommerceOffer,
        GuildAcceptPeace,
        GuildRejectAlliance,
        GuildRejectPeace,
        GuildAcceptAlliance,
        GuildOfferPeace,
        GuildOfferAlliance,
        GuildAllianceDetails,
        GuildPeaceDetails,
        GuildRequestJoinerInfo,
        GuildAlliancePropList,
        GuildPeacePropList,
        GuildDeclareWar,
        GuildNewWebsite,
        GuildAcceptNewMember,
        GuildRejectNewMember,
        GuildKickMember,
        GuildUpdateNews,
        GuildMemberInfo,
        GuildOpenElections,
        GuildRequestMembership,
        GuildRequestDetails,
        Online,
        Quit,
        GuildLeave,
        RequestAccountState,
        PetStand,
        PetFollow,
        ReleasePet,
        TrainList,
        Rest,
        Meditate,
        Resucitate,
        Heal,
        Help,
        RequestStats,
        CommerceStart,
        BankStart,
        Enlist,
        Information,
        Reward,
        RequestMotd,
        UpTime,
        PartyLeave,
        PartyCreate,
        PartyJoin,
        Inquiry,
        GuildMessage,
        PartyMessage,
        CentinelReport,
        GuildOnline,
        PartyOnline,
        CouncilMessage,
        RoleMasterRequest,
        GmRequest,
        BugReport,
        ChangeDescription,
        GuildVote,
        Punishments,
        ChangePassword,
        Gamble,
        InquiryVote,
        LeaveFaction,
        BankExtractGold,
        BankDepositGold,
        Denounce,
        GuildFundate,
        GuildFundation,
        PartyKick,
        PartySetLeader,
        PartyAcceptMember,
        Ping,
        RequestPartyForm,
        ItemUpgrade,
        GmCommands,
        InitCrafting,
        Home,
        ShowGuildNews,
        ShareNpc,
        StopSharingNpc,
        Consultation,
    }
}

opcode_registry! {
    /// Commands sent by the server.
    ServerOpcode {
        Logged,
        RemoveDialogs,
        RemoveCharDialog,
        NavigateToggle,
        Disconnect,
        CommerceEnd,
        BankEnd,
        CommerceInit,
        BankInit,
        UserCommerceInit,
        UserCommerceEnd,
        UserOfferConfirm,
        CommerceChat,
        ShowBlacksmithForm,
        ShowCarpenterForm,
        UpdateSta,
        UpdateMana,
        UpdateHp,
        UpdateGold,
        UpdateBankGold,
        UpdateExp,
        ChangeMap,
        PosUpdate,
        ChatOverHead,
        ConsoleMsg,
        GuildChat,
        ShowMessageBox,
        UserIndexInServer,
        UserCharIndexInServer,
        CharacterCreate,
        CharacterRemove,
        CharacterChangeNick,
        CharacterMove,
        ForceCharMove,
        CharacterChange,
        ObjectCreate,
        ObjectDelete,
        BlockPosition,
        PlayMidi,
        PlayWave,
        GuildList,
        AreaChanged,
        PauseToggle,
        RainToggle,
        CreateFx,
        UpdateUserStats,
        WorkRequestTarget,
        ChangeInventorySlot,
        ChangeBankSlot,
        ChangeSpellSlot,
        Atributes,
        BlacksmithWeapons,
        BlacksmithArmors,
        CarpenterObjects,
        RestOk,
        ErrorMsg,
        Blind,
        Dumb,
        ShowSignal,
        ChangeNpcInventorySlot,
        UpdateHungerAndThirst,
        Fame,
        MiniStats,
        LevelUp,
        AddForumMsg,
        ShowForumForm,
        SetInvisible,
        DiceRoll,
        MeditateToggle,
        BlindNoMore,
        DumbNoMore,
        SendSkills,
        TrainerCreatureList,
        GuildNews,
        OfferDetails,
        AlianceProposalsList,
        PeaceProposalsList,
        CharacterInfo,
        GuildLeaderInfo,
        GuildMemberInfo,
        GuildDetails,
        ShowGuildFundationForm,
        ParalizeOk,
        ShowUserRequest,
        TradeOk,
        BankOk,
        ChangeUserTradeSlot,
        SendNight,
        Pong,
        UpdateTagAndStatus,
        SpawnList,
        ShowSosForm,
        ShowMotdEditionForm,
        ShowGmPanelForm,
        UserNameList,
        ShowGuildAlign,
        ShowPartyForm,
        UpdateStrenghtAndDexterity,
        UpdateStrenght,
        UpdateDexterity,
        AddSlots,
        MultiMessage,
        StopWorking,
        CancelOfferItem,
    }
}
