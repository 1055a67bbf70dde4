//! Lua text for the two atomic routines.
//!
//! These extend the reference implementation's `_LOCK_SCRIPT`/`_UNLOCK_SCRIPT`
//! with the owner access-index (`owner:{O}`) and the `{refcount}:{time}`
//! lock record this crate's data model adds — the original tracked
//! only a bare refcount, no first-grant time and no access index.
//!
//! `KEYS[1..3]` are always `rsrc`, `lock`, `owner` in that order; `ARGV`
//! carries the mode character, owner string, and (grant only) the server
//! timestamp to stamp a first grant with. [`RedisStore`](crate::store::RedisStore)
//! loads these as [`redis::Script`]; [`MemoryStore`](crate::store::MemoryStore)
//! runs the equivalent logic natively rather than interpreting the text.

/// Conflict test + grant registration + access index + refcount.
pub const GRANT_SCRIPT: &str = r#"
local rsrc = KEYS[1]
local lock = KEYS[2]
local owner_key = KEYS[3]
local mode = ARGV[1]
local owner = ARGV[2]
local now = ARGV[3]

local grants = redis.call('smembers', rsrc)
for i, grant in ipairs(grants) do
    local grant_mode = string.match(grant, '([RW]):.+')
    local grant_owner = string.match(grant, '[RW]:(.+)')
    if grant_owner ~= owner then
        if not (grant_mode == 'R' and mode == 'R') then
            return 0
        end
    end
end

redis.call('sadd', rsrc, mode .. ':' .. owner)
redis.call('sadd', owner_key, mode .. ':' .. string.match(lock, 'lock:(.+):[RW]:.+'))

local existing = redis.call('get', lock)
if existing == false then
    redis.call('set', lock, '1:' .. now)
else
    local refcount = string.match(existing, '(%d+):')
    local first_time = string.match(existing, '%d+:(.+)')
    redis.call('set', lock, (tonumber(refcount) + 1) .. ':' .. first_time)
end
return 1
"#;

/// Refcount decrement, destroying the triple at zero.
pub const RELEASE_SCRIPT: &str = r#"
local rsrc = KEYS[1]
local lock = KEYS[2]
local owner_key = KEYS[3]
local mode = ARGV[1]
local owner = ARGV[2]

local existing = redis.call('get', lock)
if existing == false then
    return 0
end

local refcount = tonumber(string.match(existing, '(%d+):'))
if refcount <= 1 then
    redis.call('del', lock)
    redis.call('srem', rsrc, mode .. ':' .. owner)
    redis.call('srem', owner_key, mode .. ':' .. string.match(lock, 'lock:(.+):[RW]:.+'))
else
    local first_time = string.match(existing, '%d+:(.+)')
    redis.call('set', lock, (refcount - 1) .. ':' .. first_time)
end
return 1
"#;
