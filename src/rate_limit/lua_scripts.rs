/// Lua script for incrementing a fixed-window counter in Redis
///
/// The expiry is attached only by the increment that creates the window, so
/// later increments never extend it. A counter that somehow lost its TTL is
/// given one again rather than living forever.
///
/// KEYS[1] = the counter key
/// ARGV[1] = window duration (milliseconds)
///
/// Returns: the counter value after the increment
pub const INCREMENT_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local window_ms = tonumber(ARGV[1])

local count = redis.call('INCR', key)

if count == 1 then
    redis.call('PEXPIRE', key, window_ms)
elseif redis.call('PTTL', key) == -1 then
    redis.call('PEXPIRE', key, window_ms)
end

return count
"#;
